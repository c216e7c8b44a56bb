//! CSV format handling for journal records and reports
//!
//! This module centralizes all CSV format concerns, providing:
//! - JournalRecord structure for deserialization
//! - Conversion from journal rows to ledger commands
//! - Report serialization (suggestions, balances, group balances, events)
//!
//! All functions are pure (no file I/O) for easy testing.
//!
//! # Journal Columns
//!
//! `type,event,id,participant,target,amount,actor,label`. Which columns a row
//! uses depends on its type:
//!
//! | type        | id      | participant | target  | amount | actor     | label       |
//! |-------------|---------|-------------|---------|--------|-----------|-------------|
//! | `event`     |         |             |         |        | organizer | date        |
//! | `join`      |         | participant |         |        | user?     | name?       |
//! | `subgroup`  | group   |             |         |        |           | name?       |
//! | `assign`    |         | participant | group   |        |           |             |
//! | `expense`   | expense | payer?      |         | total  |           | description |
//! | `split`     | expense | participant |         |        |           |             |
//! | `total`     | expense |             |         | total  |           |             |
//! | `leave`     |         | participant |         |        |           |             |
//! | `delete`    | expense |             |         |        |           |             |
//! | `claim`     |         | from        | to      | amount | claimant  | kind?       |
//! | `confirm`   |         | from        | to      |        | confirmer | kind?       |
//! | `unconfirm` |         | from        | to      |        | user      | kind?       |
//! | `cancel`    |         |             |         |        |           |             |

use crate::types::{
    Balance, EventId, EventStatus, GroupBalance, LedgerCommand, SuggestionKey, SuggestionKind,
    SuggestionStatus,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// One journal row as it appears in the CSV
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct JournalRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub event: EventId,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub participant: Option<i64>,
    #[serde(default)]
    pub target: Option<i64>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub actor: Option<i64>,
    #[serde(default)]
    pub label: Option<String>,
}

impl JournalRecord {
    fn required(&self, value: Option<i64>, column: &str) -> Result<i64, String> {
        value.ok_or_else(|| {
            format!(
                "'{}' record for event {} requires '{}'",
                self.record_type, self.event, column
            )
        })
    }

    fn amount(&self) -> Result<Decimal, String> {
        match self.amount.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Decimal::from_str(raw).map_err(|_| {
                format!(
                    "Invalid amount '{}' for '{}' record of event {}",
                    raw, self.record_type, self.event
                )
            }),
            _ => Err(format!(
                "'{}' record for event {} requires an amount",
                self.record_type, self.event
            )),
        }
    }

    /// Label, or `None` when empty
    fn label(&self) -> Option<&str> {
        self.label
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
    }

    fn kind(&self) -> Result<SuggestionKind, String> {
        SuggestionKind::from_str(self.label().unwrap_or_default())
    }
}

/// Convert a journal row into a ledger command
///
/// Record types are case-insensitive. Missing optional labels get a
/// placeholder name built from the id.
///
/// # Returns
///
/// Result containing either:
/// - Ok(LedgerCommand) - Successfully converted record
/// - Err(String) - Error message describing the conversion failure
pub fn convert_journal_record(record: JournalRecord) -> Result<LedgerCommand, String> {
    let event = record.event;

    let command = match record.record_type.trim().to_lowercase().as_str() {
        "event" => {
            let organizer = record.required(record.actor, "actor")?;
            let raw = record
                .label()
                .ok_or_else(|| format!("'event' record for event {} requires a date label", event))?;
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| format!("Invalid date '{}' for event {}", raw, event))?;
            LedgerCommand::OpenEvent {
                event,
                organizer,
                date,
            }
        }
        "join" => {
            let participant = record.required(record.participant, "participant")?;
            LedgerCommand::Join {
                event,
                participant,
                user: record.actor,
                name: record
                    .label()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("participant {}", participant)),
            }
        }
        "subgroup" => {
            let group = record.required(record.id, "id")?;
            LedgerCommand::CreateSubGroup {
                event,
                group,
                name: record
                    .label()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("group {}", group)),
            }
        }
        "assign" => LedgerCommand::Assign {
            event,
            participant: record.required(record.participant, "participant")?,
            group: record.required(record.target, "target")?,
        },
        "expense" => LedgerCommand::AddExpense {
            event,
            expense: record.required(record.id, "id")?,
            payer: record.participant,
            total: record.amount()?,
            description: record.label().unwrap_or_default().to_string(),
        },
        "split" => LedgerCommand::ToggleParticipation {
            event,
            expense: record.required(record.id, "id")?,
            participant: record.required(record.participant, "participant")?,
        },
        "total" => LedgerCommand::SetTotal {
            event,
            expense: record.required(record.id, "id")?,
            total: record.amount()?,
        },
        "leave" => LedgerCommand::Leave {
            event,
            participant: record.required(record.participant, "participant")?,
        },
        "delete" => LedgerCommand::DeleteExpense {
            event,
            expense: record.required(record.id, "id")?,
        },
        "claim" => LedgerCommand::Claim {
            event,
            key: SuggestionKey::new(
                record.kind()?,
                record.required(record.participant, "participant")?,
                record.required(record.target, "target")?,
                record.amount()?,
            ),
            claimant: record.required(record.actor, "actor")?,
        },
        "confirm" => LedgerCommand::Confirm {
            event,
            kind: record.kind()?,
            from_id: record.required(record.participant, "participant")?,
            to_id: record.required(record.target, "target")?,
            confirmer: record.required(record.actor, "actor")?,
        },
        "unconfirm" => LedgerCommand::Unconfirm {
            event,
            kind: record.kind()?,
            from_id: record.required(record.participant, "participant")?,
            to_id: record.required(record.target, "target")?,
            user: record.required(record.actor, "actor")?,
        },
        "cancel" => LedgerCommand::Cancel { event },
        _ => {
            return Err(format!(
                "Invalid record type: '{}' for event {}",
                record.record_type, event
            ))
        }
    };

    Ok(command)
}

/// Per-event line of the events report
#[derive(Debug, Clone, PartialEq)]
pub struct EventSummary {
    pub event: EventId,
    pub date: NaiveDate,
    pub status: EventStatus,
    pub settled: bool,
    pub fully_confirmed: bool,
}

fn write_rows<I>(header: &[&str], rows: I, output: &mut dyn Write) -> Result<(), String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(header)
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    for row in rows {
        writer
            .write_record(&row)
            .map_err(|e| format!("Failed to write report record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

/// Write annotated suggestions, in the order given
///
/// Columns: event, kind, index, from_id, from, to_id, to, amount, status
pub fn write_suggestions_csv(
    rows: &[(EventId, SuggestionStatus)],
    output: &mut dyn Write,
) -> Result<(), String> {
    write_rows(
        &[
            "event", "kind", "index", "from_id", "from", "to_id", "to", "amount", "status",
        ],
        rows.iter().map(|(event, status)| {
            let suggestion = &status.suggestion;
            vec![
                event.to_string(),
                suggestion.kind.to_string(),
                status.index.to_string(),
                suggestion.from_id.to_string(),
                suggestion.from.clone(),
                suggestion.to_id.to_string(),
                suggestion.to.clone(),
                format!("{:.2}", suggestion.amount),
                status.state.to_string(),
            ]
        }),
        output,
    )
}

/// Columns: event, participant, name, paid, owed, net
pub fn write_balances_csv(rows: &[(EventId, Balance)], output: &mut dyn Write) -> Result<(), String> {
    write_rows(
        &["event", "participant", "name", "paid", "owed", "net"],
        rows.iter().map(|(event, balance)| {
            vec![
                event.to_string(),
                balance.participant.to_string(),
                balance.name.clone(),
                format!("{:.2}", balance.total_paid),
                format!("{:.2}", balance.total_owed),
                format!("{:.2}", balance.net),
            ]
        }),
        output,
    )
}

/// Columns: event, group, name, members, paid, owed, net
///
/// Members are space-separated participant ids.
pub fn write_group_balances_csv(
    rows: &[(EventId, GroupBalance)],
    output: &mut dyn Write,
) -> Result<(), String> {
    write_rows(
        &["event", "group", "name", "members", "paid", "owed", "net"],
        rows.iter().map(|(event, balance)| {
            let members: Vec<String> = balance.members.iter().map(|m| m.to_string()).collect();
            vec![
                event.to_string(),
                balance.group.to_string(),
                balance.name.clone(),
                members.join(" "),
                format!("{:.2}", balance.total_paid),
                format!("{:.2}", balance.total_owed),
                format!("{:.2}", balance.net),
            ]
        }),
        output,
    )
}

/// Columns: event, date, status, settled, fully_confirmed
pub fn write_events_csv(rows: &[EventSummary], output: &mut dyn Write) -> Result<(), String> {
    write_rows(
        &["event", "date", "status", "settled", "fully_confirmed"],
        rows.iter().map(|summary| {
            vec![
                summary.event.to_string(),
                summary.date.format("%Y-%m-%d").to_string(),
                summary.status.to_string(),
                summary.settled.to_string(),
                summary.fully_confirmed.to_string(),
            ]
        }),
        output,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentState, SettlementSuggestion};
    use rstest::rstest;

    fn record(record_type: &str) -> JournalRecord {
        JournalRecord {
            record_type: record_type.to_string(),
            event: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_convert_event_record() {
        let mut row = record("event");
        row.actor = Some(100);
        row.label = Some("2026-05-10".to_string());

        assert_eq!(
            convert_journal_record(row).unwrap(),
            LedgerCommand::OpenEvent {
                event: 1,
                organizer: 100,
                date: NaiveDate::from_ymd_opt(2026, 5, 10).unwrap(),
            }
        );
    }

    #[test]
    fn test_convert_join_defaults_name() {
        let mut row = record("JOIN");
        row.participant = Some(7);

        assert_eq!(
            convert_journal_record(row).unwrap(),
            LedgerCommand::Join {
                event: 1,
                participant: 7,
                user: None,
                name: "participant 7".to_string(),
            }
        );
    }

    #[test]
    fn test_convert_placeholder_expense() {
        let mut row = record("expense");
        row.id = Some(3);
        row.amount = Some(" 90.00 ".to_string());
        row.label = Some("Dinner".to_string());

        assert_eq!(
            convert_journal_record(row).unwrap(),
            LedgerCommand::AddExpense {
                event: 1,
                expense: 3,
                payer: None,
                total: Decimal::new(9000, 2),
                description: "Dinner".to_string(),
            }
        );
    }

    #[rstest]
    #[case::default_kind(None, SuggestionKind::Individual)]
    #[case::group_kind(Some("between_groups"), SuggestionKind::BetweenGroups)]
    fn test_convert_claim(#[case] label: Option<&str>, #[case] kind: SuggestionKind) {
        let mut row = record("claim");
        row.participant = Some(-3);
        row.target = Some(10);
        row.amount = Some("30.00".to_string());
        row.actor = Some(3);
        row.label = label.map(str::to_string);

        assert_eq!(
            convert_journal_record(row).unwrap(),
            LedgerCommand::Claim {
                event: 1,
                key: SuggestionKey::new(kind, -3, 10, Decimal::new(3000, 2)),
                claimant: 3,
            }
        );
    }

    #[rstest]
    #[case::invalid_type("refund", "Invalid record type")]
    #[case::event_without_organizer("event", "requires 'actor'")]
    #[case::expense_without_id("expense", "requires 'id'")]
    #[case::split_without_id("split", "requires 'id'")]
    #[case::confirm_without_endpoints("confirm", "requires 'participant'")]
    fn test_convert_missing_fields(#[case] record_type: &str, #[case] expected_error: &str) {
        let result = convert_journal_record(record(record_type));
        assert!(result.unwrap_err().contains(expected_error));
    }

    #[rstest]
    #[case::bad_amount(Some("ninety"), "Invalid amount")]
    #[case::empty_amount(Some("  "), "requires an amount")]
    #[case::no_amount(None, "requires an amount")]
    fn test_convert_amount_errors(#[case] amount: Option<&str>, #[case] expected_error: &str) {
        let mut row = record("total");
        row.id = Some(1);
        row.amount = amount.map(str::to_string);
        assert!(convert_journal_record(row).unwrap_err().contains(expected_error));
    }

    #[test]
    fn test_convert_bad_date_and_kind() {
        let mut event = record("event");
        event.actor = Some(100);
        event.label = Some("10/05/2026".to_string());
        assert!(convert_journal_record(event).unwrap_err().contains("Invalid date"));

        let mut confirm = record("confirm");
        confirm.participant = Some(2);
        confirm.target = Some(1);
        confirm.actor = Some(1);
        confirm.label = Some("family".to_string());
        assert!(convert_journal_record(confirm)
            .unwrap_err()
            .contains("unknown suggestion kind"));
    }

    #[test]
    fn test_write_suggestions_csv() {
        let status = SuggestionStatus {
            index: 0,
            suggestion: SettlementSuggestion {
                kind: SuggestionKind::Individual,
                from_id: 2,
                from: "B".to_string(),
                to_id: 1,
                to: "A".to_string(),
                amount: Decimal::new(30, 0),
            },
            state: PaymentState::Claimed,
            payment: None,
        };
        let mut output = Vec::new();

        write_suggestions_csv(&[(1, status)], &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "event,kind,index,from_id,from,to_id,to,amount,status\n\
             1,INDIVIDUAL,0,2,B,1,A,30.00,CLAIMED\n"
        );
    }

    #[test]
    fn test_write_group_balances_csv() {
        let balance = GroupBalance {
            group: 10,
            name: "Family".to_string(),
            members: vec![1, 2],
            total_paid: Decimal::new(12000, 2),
            total_owed: Decimal::new(6000, 2),
            net: Decimal::new(6000, 2),
        };
        let mut output = Vec::new();

        write_group_balances_csv(&[(1, balance)], &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.ends_with("1,10,Family,1 2,120.00,60.00,60.00\n"));
    }

    #[test]
    fn test_write_empty_balances_has_header_only() {
        let mut output = Vec::new();
        write_balances_csv(&[], &mut output).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "event,participant,name,paid,owed,net\n"
        );
    }

    #[test]
    fn test_write_events_csv() {
        let summary = EventSummary {
            event: 4,
            date: NaiveDate::from_ymd_opt(2026, 5, 10).unwrap(),
            status: EventStatus::Open,
            settled: false,
            fully_confirmed: true,
        };
        let mut output = Vec::new();
        write_events_csv(&[summary], &mut output).unwrap();
        assert!(String::from_utf8(output)
            .unwrap()
            .ends_with("4,2026-05-10,OPEN,false,true\n"));
    }
}

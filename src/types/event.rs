//! Event membership types
//!
//! Identifiers, participants, events and sub-groups. These are the records the
//! directory collaborator owns; the settlement engine only reads them, apart
//! from the membership operations exposed on the engine facade.

use chrono::NaiveDate;
use std::fmt;

/// Event identifier
pub type EventId = i64;

/// Participant identifier (always positive)
pub type ParticipantId = i64;

/// Sub-group identifier
///
/// Real sub-groups have positive ids. Solo participants are represented at the
/// group level by the negated participant id, see [`solo_group_id`].
pub type SubGroupId = i64;

/// Expense identifier
pub type ExpenseId = i64;

/// Payment identifier
pub type PaymentId = i64;

/// User account identifier (organizers and participant owners)
pub type UserId = i64;

/// Group-level id of a participant that belongs to no sub-group
pub fn solo_group_id(participant: ParticipantId) -> SubGroupId {
    -participant
}

/// Participant behind a solo pseudo-group id, if `group` is one
pub fn solo_participant(group: SubGroupId) -> Option<ParticipantId> {
    (group < 0).then_some(-group)
}

/// A person who can take part in events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    /// User account linked to this participant, when they have one
    pub user: Option<UserId>,
    /// Payment address shown next to transfer suggestions
    pub pix_key: Option<String>,
    pub email: Option<String>,
}

impl Participant {
    pub fn new(id: ParticipantId, name: impl Into<String>) -> Self {
        Participant {
            id,
            name: name.into(),
            user: None,
            pix_key: None,
            email: None,
        }
    }

    pub fn with_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }
}

/// Lifecycle of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventStatus {
    Open,
    Closed,
    Cancelled,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventStatus::Open => "OPEN",
            EventStatus::Closed => "CLOSED",
            EventStatus::Cancelled => "CANCELLED",
        };
        f.write_str(label)
    }
}

/// A shared-expense occasion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub organizer: UserId,
    pub date: NaiveDate,
    pub status: EventStatus,
    pub share_token: Option<String>,
}

impl Event {
    pub fn new(id: EventId, name: impl Into<String>, organizer: UserId, date: NaiveDate) -> Self {
        Event {
            id,
            name: name.into(),
            organizer,
            date,
            status: EventStatus::Open,
            share_token: None,
        }
    }
}

/// A named partition of event members used for group-level netting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubGroup {
    pub id: SubGroupId,
    pub event: EventId,
    pub name: String,
    /// Members in assignment order
    pub members: Vec<ParticipantId>,
}

impl SubGroup {
    pub fn new(id: SubGroupId, event: EventId, name: impl Into<String>) -> Self {
        SubGroup {
            id,
            event,
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn contains(&self, participant: ParticipantId) -> bool {
        self.members.contains(&participant)
    }
}

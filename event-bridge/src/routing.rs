//! Destination resolution: category → broker destination.

use crate::event::EventCategory;

/// The logical publish targets. Filled from configuration; the names are
/// broker topics.
#[derive(Debug, Clone)]
pub struct Destinations {
    pub default: String,
    pub membership: String,
    pub presence: String,
    pub ignored: String,
}

pub struct Router {
    destinations: Destinations,
}

impl Router {
    pub fn new(destinations: Destinations) -> Router {
        Router { destinations }
    }

    /// Pure lookup. Membership is checked before liveness, so an event
    /// somehow matching both is routed deterministically.
    pub fn route(&self, category: EventCategory) -> &str {
        if Self::is_membership(category) {
            &self.destinations.membership
        } else if Self::is_liveness(category) {
            &self.destinations.presence
        } else {
            &self.destinations.default
        }
    }

    /// Destination for events caught by an ignore rule. Resolved at an
    /// earlier stage than `route`; ignored events never carry a category.
    pub fn ignored_destination(&self) -> &str {
        &self.destinations.ignored
    }

    fn is_membership(category: EventCategory) -> bool {
        matches!(
            category,
            EventCategory::Contact | EventCategory::GroupMembership | EventCategory::GroupAction
        )
    }

    fn is_liveness(category: EventCategory) -> bool {
        matches!(category, EventCategory::Presence)
    }
}

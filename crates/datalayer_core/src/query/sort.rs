//! Ordering specification.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One sort key. `property` may cross a relation (`team.name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
}

/// Ordered sequence of sort keys; earlier keys take precedence.
///
/// Properties are resolved when a statement is built, so an unknown
/// property surfaces as `InvalidPredicate` from the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    orders: Vec<Order>,
}

impl Sort {
    pub fn unsorted() -> Self {
        Self::default()
    }

    pub fn by(direction: Direction, property: impl Into<String>) -> Self {
        Self::unsorted().then(direction, property)
    }

    pub fn asc(property: impl Into<String>) -> Self {
        Self::by(Direction::Asc, property)
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self::by(Direction::Desc, property)
    }

    /// Appends a lower-precedence key.
    pub fn then(mut self, direction: Direction, property: impl Into<String>) -> Self {
        self.orders.push(Order {
            property: property.into(),
            direction,
        });
        self
    }

    /// Appends every key of `other` after this sort's keys.
    pub fn and(mut self, other: Sort) -> Self {
        self.orders.extend(other.orders);
        self
    }

    pub fn is_unsorted(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }
}

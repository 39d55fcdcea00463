use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{ActorId, MovementId, ProductId};
use stockroom_events::Event;

/// Direction of a stock movement. Quantities are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Inbound,
    Outbound,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Inbound => "inbound",
            MovementType::Outbound => "outbound",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(MovementType::Inbound),
            "outbound" => Some(MovementType::Outbound),
            _ => None,
        }
    }
}

/// A movement decided by the ledger but not yet stamped by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementDraft {
    pub product_id: ProductId,
    pub quantity: u64,
    pub kind: MovementType,
    pub responsible: Option<ActorId>,
    pub notes: Option<String>,
}

impl MovementDraft {
    /// Stamp the draft with the identity, time and position assigned at commit.
    pub fn record(self, id: MovementId, timestamp: DateTime<Utc>, sequence: u64) -> Movement {
        Movement {
            id,
            product_id: self.product_id,
            quantity: self.quantity,
            kind: self.kind,
            timestamp,
            sequence,
            responsible: self.responsible,
            notes: self.notes,
        }
    }
}

/// One immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    id: MovementId,
    product_id: ProductId,
    quantity: u64,
    #[serde(rename = "type")]
    kind: MovementType,
    timestamp: DateTime<Utc>,
    /// Position in the product's history, starting at 1.
    sequence: u64,
    responsible: Option<ActorId>,
    notes: Option<String>,
}

impl Movement {
    pub fn id(&self) -> MovementId {
        self.id
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn kind(&self) -> MovementType {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn responsible(&self) -> Option<&ActorId> {
        self.responsible.as_ref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}

/// Totals recomputed from a movement history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub inbound: u64,
    pub outbound: u64,
}

impl LedgerTotals {
    pub fn from_movements<'a>(movements: impl IntoIterator<Item = &'a Movement>) -> Self {
        movements
            .into_iter()
            .fold(Self::default(), |mut totals, m| {
                match m.kind {
                    MovementType::Inbound => totals.inbound = totals.inbound.saturating_add(m.quantity),
                    MovementType::Outbound => {
                        totals.outbound = totals.outbound.saturating_add(m.quantity)
                    }
                }
                totals
            })
    }

    /// Stock justified by the history; `None` if outbound exceeds inbound.
    pub fn balance(&self) -> Option<u64> {
        self.inbound.checked_sub(self.outbound)
    }
}

/// Events emitted by the stock ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    MovementRecorded(Movement),
}

impl StockEvent {
    pub fn product_id(&self) -> &ProductId {
        match self {
            StockEvent::MovementRecorded(m) => &m.product_id,
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::MovementRecorded(_) => "inventory.stock.movement_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::MovementRecorded(m) => m.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn movement(kind: MovementType, quantity: u64, sequence: u64) -> Movement {
        MovementDraft {
            product_id: ProductId::parse("p-1").unwrap(),
            quantity,
            kind,
            responsible: None,
            notes: None,
        }
        .record(
            MovementId::new(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(sequence as i64),
            sequence,
        )
    }

    #[test]
    fn totals_balance_inbound_against_outbound() {
        let history = vec![
            movement(MovementType::Inbound, 10, 1),
            movement(MovementType::Outbound, 4, 2),
            movement(MovementType::Inbound, 1, 3),
        ];
        let totals = LedgerTotals::from_movements(&history);
        assert_eq!(totals.inbound, 11);
        assert_eq!(totals.outbound, 4);
        assert_eq!(totals.balance(), Some(7));
    }

    #[test]
    fn totals_detect_overdrawn_history() {
        let history = vec![movement(MovementType::Outbound, 1, 1)];
        assert_eq!(LedgerTotals::from_movements(&history).balance(), None);
    }

    #[test]
    fn movement_type_serializes_under_type_key() {
        let json = serde_json::to_value(movement(MovementType::Outbound, 2, 1)).unwrap();
        assert_eq!(json["type"], "outbound");
        assert_eq!(MovementType::parse("inbound"), Some(MovementType::Inbound));
        assert_eq!(MovementType::parse("sideways"), None);
    }

    #[test]
    fn stock_event_metadata() {
        let m = movement(MovementType::Inbound, 5, 1);
        let ts = m.timestamp();
        let event = StockEvent::MovementRecorded(m);
        assert_eq!(event.event_type(), "inventory.stock.movement_recorded");
        assert_eq!(event.occurred_at(), ts);
        assert_eq!(event.version(), 1);
        assert_eq!(event.product_id().as_str(), "p-1");
    }
}

//! 投入事件與棧板狀態同步
//!
//! 核心不擁有棧板狀態機，只在投入新增或刪除時發出事件，由外部監聽者
//! （例如 [`PalletStateTracker`]）維持 registered ↔ processed 的一致性。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::flow::ProductionInput;
use crate::inventory::{Pallet, PalletState, StockBox};
use crate::{BoxId, PalletId, ProductionId, RecordId};

/// 投入事件
///
/// `production_id` 是消耗端紀錄所屬的批次，`box_lot` 是箱本身的批號。
/// 兩者不同時，箱所屬批次的去向也隨之改變。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InputEvent {
    Added {
        box_id: BoxId,
        box_lot: String,
        pallet_id: Option<PalletId>,
        production_record_id: RecordId,
        production_id: ProductionId,
    },
    Removed {
        box_id: BoxId,
        box_lot: String,
        pallet_id: Option<PalletId>,
        production_record_id: RecordId,
        production_id: ProductionId,
    },
}

impl InputEvent {
    /// 投入被刪除時的事件
    pub fn removed(input: &ProductionInput, stock_box: &StockBox, production_id: ProductionId) -> Self {
        Self::Removed {
            box_id: input.box_id,
            box_lot: stock_box.lot.clone(),
            pallet_id: stock_box.pallet_id,
            production_record_id: input.production_record_id,
            production_id,
        }
    }

    pub fn pallet_id(&self) -> Option<PalletId> {
        match self {
            Self::Added { pallet_id, .. } | Self::Removed { pallet_id, .. } => *pallet_id,
        }
    }

    /// 消耗端批次
    pub fn production_id(&self) -> ProductionId {
        match self {
            Self::Added { production_id, .. } | Self::Removed { production_id, .. } => {
                *production_id
            }
        }
    }

    /// 箱所屬的批號
    pub fn box_lot(&self) -> &str {
        match self {
            Self::Added { box_lot, .. } | Self::Removed { box_lot, .. } => box_lot,
        }
    }
}

/// 投入事件監聽者
pub trait InputEventListener {
    fn on_input_event(&mut self, event: &InputEvent);
}

/// 棧板狀態轉換紀錄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PalletTransition {
    pub pallet_id: PalletId,
    pub from: PalletState,
    pub to: PalletState,
}

#[derive(Debug, Clone)]
struct PalletCounts {
    state: PalletState,
    total_boxes: usize,
    available_boxes: usize,
}

/// 棧板狀態追蹤器
///
/// - registered 或 stored 棧板上所有箱皆被消耗 → processed
/// - processed 棧板重新有可用箱 → registered
/// - shipped 棧板不受投入影響
pub struct PalletStateTracker {
    pallets: HashMap<PalletId, PalletCounts>,
    transitions: Vec<PalletTransition>,
}

impl PalletStateTracker {
    /// 以棧板與其箱的目前狀態建立追蹤器
    pub fn new(pallets: &[Pallet], boxes: &[StockBox]) -> Self {
        let mut counts: HashMap<PalletId, PalletCounts> = pallets
            .iter()
            .map(|p| {
                (
                    p.id,
                    PalletCounts {
                        state: p.state,
                        total_boxes: 0,
                        available_boxes: 0,
                    },
                )
            })
            .collect();

        for stock_box in boxes {
            if let Some(entry) = stock_box.pallet_id.and_then(|id| counts.get_mut(&id)) {
                entry.total_boxes += 1;
                if stock_box.is_available() {
                    entry.available_boxes += 1;
                }
            }
        }

        Self {
            pallets: counts,
            transitions: Vec::new(),
        }
    }

    /// 依可用箱數推導下一狀態
    pub fn next_state(current: PalletState, total_boxes: usize, available_boxes: usize) -> PalletState {
        let consumable = matches!(current, PalletState::Registered | PalletState::Stored);
        if consumable && total_boxes > 0 && available_boxes == 0 {
            PalletState::Processed
        } else if current == PalletState::Processed && available_boxes > 0 {
            PalletState::Registered
        } else {
            current
        }
    }

    pub fn state_of(&self, pallet_id: PalletId) -> Option<PalletState> {
        self.pallets.get(&pallet_id).map(|c| c.state)
    }

    /// 已發生的狀態轉換
    pub fn transitions(&self) -> &[PalletTransition] {
        &self.transitions
    }

    fn apply(&mut self, pallet_id: PalletId, consumed: bool) {
        let Some(entry) = self.pallets.get_mut(&pallet_id) else {
            tracing::debug!("棧板 {} 未被追蹤，忽略事件", pallet_id);
            return;
        };

        if consumed {
            entry.available_boxes = entry.available_boxes.saturating_sub(1);
        } else if entry.available_boxes < entry.total_boxes {
            entry.available_boxes += 1;
        }

        let next = Self::next_state(entry.state, entry.total_boxes, entry.available_boxes);
        if next != entry.state {
            tracing::debug!(
                "棧板 {} 狀態轉換: {} → {}",
                pallet_id,
                entry.state.name(),
                next.name()
            );
            self.transitions.push(PalletTransition {
                pallet_id,
                from: entry.state,
                to: next,
            });
            entry.state = next;
        }
    }
}

impl InputEventListener for PalletStateTracker {
    fn on_input_event(&mut self, event: &InputEvent) {
        let consumed = matches!(event, InputEvent::Added { .. });
        if let Some(pallet_id) = event.pallet_id() {
            self.apply(pallet_id, consumed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::ProductRef;
    use crate::production::ProductionRecord;
    use rust_decimal::Decimal;

    fn boxes() -> Vec<StockBox> {
        (1..=2)
            .map(|id| {
                StockBox::new(id, ProductRef::new(1, "Merluza"), "R1", Decimal::from(20))
                    .with_pallet(10)
            })
            .collect()
    }

    #[test]
    fn test_pallet_processed_when_all_boxes_consumed() {
        let pallets = vec![Pallet::new(10, PalletState::Stored)];
        let boxes = boxes();
        let mut tracker = PalletStateTracker::new(&pallets, &boxes);
        let record = ProductionRecord::new(1, 1);

        let (_, first) = ProductionInput::consume(1, &record, &boxes[0]).unwrap();
        tracker.on_input_event(&first);
        assert_eq!(tracker.state_of(10), Some(PalletState::Stored));

        let (_, second) = ProductionInput::consume(2, &record, &boxes[1]).unwrap();
        tracker.on_input_event(&second);
        assert_eq!(tracker.state_of(10), Some(PalletState::Processed));
        assert_eq!(tracker.transitions().len(), 1);
    }

    #[test]
    fn test_pallet_registered_when_input_removed() {
        let pallets = vec![Pallet::new(10, PalletState::Processed)];
        let mut boxes = boxes();
        for b in boxes.iter_mut() {
            b.production_inputs.push(crate::inventory::BoxConsumptionRef {
                input_id: b.id,
                production_record_id: 1,
                production_id: 1,
            });
        }
        let mut tracker = PalletStateTracker::new(&pallets, &boxes);

        let input = ProductionInput::new(1, 1, boxes[0].id);
        tracker.on_input_event(&InputEvent::removed(&input, &boxes[0], 1));

        assert_eq!(tracker.state_of(10), Some(PalletState::Registered));
        assert_eq!(
            tracker.transitions()[0],
            PalletTransition {
                pallet_id: 10,
                from: PalletState::Processed,
                to: PalletState::Registered,
            }
        );
    }

    #[test]
    fn test_next_state() {
        assert_eq!(
            PalletStateTracker::next_state(PalletState::Registered, 0, 0),
            PalletState::Registered
        );
        assert_eq!(
            PalletStateTracker::next_state(PalletState::Shipped, 3, 1),
            PalletState::Shipped
        );
        assert_eq!(
            PalletStateTracker::next_state(PalletState::Stored, 3, 0),
            PalletState::Processed
        );
        assert_eq!(
            PalletStateTracker::next_state(PalletState::Processed, 3, 0),
            PalletState::Processed
        );
    }

    #[test]
    fn test_shipped_pallet_stays_shipped_when_consumed() {
        let pallets = vec![Pallet::new(10, PalletState::Shipped)];
        let boxes = boxes();
        let mut tracker = PalletStateTracker::new(&pallets, &boxes);
        let record = ProductionRecord::new(1, 1);

        for (id, stock_box) in boxes.iter().enumerate() {
            let (_, event) = ProductionInput::consume(id as u64 + 1, &record, stock_box).unwrap();
            tracker.on_input_event(&event);
        }

        assert_eq!(tracker.state_of(10), Some(PalletState::Shipped));
        assert!(tracker.transitions().is_empty());
    }

    #[test]
    fn test_event_carries_box_lot() {
        let boxes = boxes();
        let record = ProductionRecord::new(1, 2);
        let (_, event) = ProductionInput::consume(1, &record, &boxes[0]).unwrap();

        assert_eq!(event.production_id(), 2);
        assert_eq!(event.box_lot(), "R1");
    }
}

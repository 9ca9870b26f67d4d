use serde::{Deserialize, Serialize};

use fieldcrm_core::OrderId;
use fieldcrm_inventory::DeviceCategory;

use crate::order::{ActivatedService, Order, ServiceType};
use crate::pattern::{CodeKind, CodePatternTable};
use crate::rate::RateCatalog;

/// One billable line of a settled order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettlementEntry {
    pub order_id: OrderId,
    pub code: String,
    pub quantity: u32,
}

/// Settle `order` against `catalog` using the current pattern table.
pub fn compute_settlement(order: &Order, catalog: &RateCatalog) -> Vec<SettlementEntry> {
    compute_settlement_with(order, catalog, &CodePatternTable::v1())
}

/// Deterministic: entries come out in first-contribution order (sockets,
/// connection, per-service device codes, riser, trunk). Kinds with no
/// matching rate are omitted, as are zero counts. Quantities saturate at
/// `u32::MAX`.
pub fn compute_settlement_with(
    order: &Order,
    catalog: &RateCatalog,
    table: &CodePatternTable,
) -> Vec<SettlementEntry> {
    let mut tally = Tally::default();
    let mut add = |kind: CodeKind, quantity: u32| {
        if let Some(rate) = table.resolve(kind, catalog) {
            tally.add(&rate.code, quantity);
        }
    };

    add(
        CodeKind::Socket,
        u32::try_from(order.activated_services.len()).unwrap_or(u32::MAX),
    );
    add(CodeKind::Connection, 1);
    for service in &order.activated_services {
        if let Some(kind) = device_code_kind(service) {
            add(kind, 1);
        }
    }
    add(CodeKind::Riser, order.riser_count);
    add(CodeKind::Trunk, order.trunk_count);

    tally
        .lines
        .into_iter()
        .filter(|(_, quantity)| *quantity > 0)
        .map(|(code, quantity)| SettlementEntry {
            order_id: order.id,
            code,
            quantity,
        })
        .collect()
}

fn device_code_kind(service: &ActivatedService) -> Option<CodeKind> {
    match service.service_type {
        ServiceType::Net | ServiceType::Tel => Some(CodeKind::ModemNetTel),
        ServiceType::Dtv => match service.device_category {
            Some(DeviceCategory::Decoder2Way) => Some(CodeKind::Decoder2Way),
            _ => Some(CodeKind::Decoder1Way),
        },
        ServiceType::Atv => None,
    }
}

/// Total payout for a settlement, in minor currency units.
///
/// Codes missing from the catalog contribute nothing. Saturates at `u64::MAX`.
pub fn settlement_value(entries: &[SettlementEntry], catalog: &RateCatalog) -> u64 {
    entries
        .iter()
        .filter_map(|e| catalog.get(&e.code).map(|r| r.amount.saturating_mul(u64::from(e.quantity))))
        .fold(0, u64::saturating_add)
}

#[derive(Default)]
struct Tally {
    lines: Vec<(String, u32)>,
}

impl Tally {
    fn add(&mut self, code: &str, quantity: u32) {
        match self.lines.iter_mut().find(|(c, _)| c == code) {
            Some((_, q)) => *q = q.saturating_add(quantity),
            None => self.lines.push((code.to_string(), quantity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldcrm_core::TenantId;
    use fieldcrm_inventory::ItemId;
    use proptest::prelude::*;

    use crate::order::OrderType;
    use crate::rate::RateDefinition;

    fn net_dtv_rates() -> RateCatalog {
        RateCatalog::new(vec![
            RateDefinition::new("GNIAZDO", 5),
            RateDefinition::new("PRZYLACZE", 10),
            RateDefinition::new("MODEM_NET_TEL", 7),
            RateDefinition::new("DEKODER_1WAY", 6),
        ])
        .unwrap()
    }

    fn full_rates() -> RateCatalog {
        RateCatalog::new(vec![
            RateDefinition::new("GNIAZDO", 5),
            RateDefinition::new("PRZYLACZE", 10),
            RateDefinition::new("MODEM_NET_TEL", 7),
            RateDefinition::new("DEKODER_1WAY", 6),
            RateDefinition::new("DEKODER_2WAY", 8),
            RateDefinition::new("PION", 3),
            RateDefinition::new("LISTWA", 2),
        ])
        .unwrap()
    }

    fn order() -> Order {
        Order::new(OrderId::new(), TenantId::new(), OrderType::Installation)
    }

    fn lines(entries: &[SettlementEntry]) -> Vec<(&str, u32)> {
        entries.iter().map(|e| (e.code.as_str(), e.quantity)).collect()
    }

    #[test]
    fn net_and_one_way_dtv() {
        let o = order()
            .with_service(ActivatedService::new(ServiceType::Net))
            .with_service(ActivatedService::new(ServiceType::Dtv).with_device(ItemId::generate(), DeviceCategory::Decoder1Way));

        let entries = compute_settlement(&o, &net_dtv_rates());

        assert_eq!(
            lines(&entries),
            vec![("GNIAZDO", 2), ("PRZYLACZE", 1), ("MODEM_NET_TEL", 1), ("DEKODER_1WAY", 1)]
        );
        assert!(entries.iter().all(|e| e.order_id == o.id));
        assert_eq!(settlement_value(&entries, &net_dtv_rates()), 10 + 10 + 7 + 6);
    }

    #[test]
    fn atv_counts_as_socket_only() {
        let o = order().with_service(ActivatedService::new(ServiceType::Atv));
        assert_eq!(lines(&compute_settlement(&o, &full_rates())), vec![("GNIAZDO", 1), ("PRZYLACZE", 1)]);
    }

    #[test]
    fn two_way_decoder_selects_two_way_code() {
        let o = order()
            .with_service(ActivatedService::new(ServiceType::Dtv).with_device(ItemId::generate(), DeviceCategory::Decoder2Way))
            .with_service(ActivatedService::new(ServiceType::Dtv));
        let entries = compute_settlement(&o, &full_rates());
        assert_eq!(
            lines(&entries),
            vec![("GNIAZDO", 2), ("PRZYLACZE", 1), ("DEKODER_2WAY", 1), ("DEKODER_1WAY", 1)]
        );
    }

    #[test]
    fn net_and_tel_share_the_modem_code() {
        let o = order()
            .with_service(ActivatedService::new(ServiceType::Net))
            .with_service(ActivatedService::new(ServiceType::Tel));
        let entries = compute_settlement(&o, &full_rates());
        assert!(lines(&entries).contains(&("MODEM_NET_TEL", 2)));
    }

    #[test]
    fn riser_and_trunk_use_manual_counts() {
        let mut o = order().with_service(ActivatedService::new(ServiceType::Net));
        o.riser_count = 3;
        o.trunk_count = 12;
        let entries = compute_settlement(&o, &full_rates());
        assert!(lines(&entries).contains(&("PION", 3)));
        assert!(lines(&entries).contains(&("LISTWA", 12)));

        o.riser_count = 0;
        let entries = compute_settlement(&o, &full_rates());
        assert!(entries.iter().all(|e| e.code != "PION"));
    }

    #[test]
    fn missing_rates_are_omitted() {
        let rates = RateCatalog::new(vec![RateDefinition::new("PRZYLACZE", 10)]).unwrap();
        let o = order()
            .with_service(ActivatedService::new(ServiceType::Net))
            .with_service(ActivatedService::new(ServiceType::Dtv));
        assert_eq!(lines(&compute_settlement(&o, &rates)), vec![("PRZYLACZE", 1)]);
    }

    #[test]
    fn colliding_patterns_merge_into_one_code() {
        // MODEM_DEKODER_1WAY matches both the modem and the 1-way patterns.
        let rates = RateCatalog::new(vec![RateDefinition::new("MODEM_DEKODER_1WAY", 1)]).unwrap();
        let o = order()
            .with_service(ActivatedService::new(ServiceType::Net))
            .with_service(ActivatedService::new(ServiceType::Dtv));
        assert_eq!(lines(&compute_settlement(&o, &rates)), vec![("MODEM_DEKODER_1WAY", 2)]);
    }

    #[test]
    fn merged_counts_saturate_instead_of_overflowing() {
        // GNIAZDO_PION resolves for both sockets and risers.
        let rates = RateCatalog::new(vec![RateDefinition::new("GNIAZDO_PION", u64::MAX)]).unwrap();
        let mut o = order().with_service(ActivatedService::new(ServiceType::Net));
        o.riser_count = u32::MAX;

        let entries = compute_settlement(&o, &rates);
        assert_eq!(lines(&entries), vec![("GNIAZDO_PION", u32::MAX)]);
        assert_eq!(settlement_value(&entries, &rates), u64::MAX);
    }

    fn service_strategy() -> impl Strategy<Value = ActivatedService> {
        let service_type = prop_oneof![
            Just(ServiceType::Net),
            Just(ServiceType::Tel),
            Just(ServiceType::Dtv),
            Just(ServiceType::Atv),
        ];
        let category = prop_oneof![
            Just(None),
            Just(Some(DeviceCategory::Decoder1Way)),
            Just(Some(DeviceCategory::Decoder2Way)),
            Just(Some(DeviceCategory::Modem)),
        ];
        (service_type, category).prop_map(|(service_type, device_category)| ActivatedService {
            service_type,
            device_id: None,
            device_category,
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: settlement is a pure function of its inputs.
        #[test]
        fn settlement_is_deterministic(
            services in prop::collection::vec(service_strategy(), 0..12),
            riser in 0u32..5,
            trunk in 0u32..5,
        ) {
            let mut o = order();
            o.activated_services = services;
            o.riser_count = riser;
            o.trunk_count = trunk;
            let rates = full_rates();

            let first = compute_settlement(&o, &rates);
            let second = compute_settlement(&o, &rates);
            prop_assert_eq!(&first, &second);

            prop_assert!(first.iter().all(|e| e.quantity > 0));
            let sockets = first.iter().find(|e| e.code == "GNIAZDO").map(|e| e.quantity).unwrap_or(0);
            prop_assert_eq!(sockets as usize, o.activated_services.len());
            let devices: u32 = first
                .iter()
                .filter(|e| e.code.starts_with("MODEM") || e.code.starts_with("DEKODER"))
                .map(|e| e.quantity)
                .sum();
            let non_atv = o.activated_services.iter().filter(|s| s.service_type != ServiceType::Atv).count();
            prop_assert_eq!(devices as usize, non_atv);
        }
    }
}

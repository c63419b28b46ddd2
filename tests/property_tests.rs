//! Property-based tests for pricing, cart and webhook invariants.

use proptest::prelude::*;
use storefront_api::gateway::webhook::{sign, verify_signature};
use storefront_api::models::CartLine;
use storefront_api::services::{cart, pricing};
use uuid::Uuid;

fn line_strategy() -> impl Strategy<Value = CartLine> {
    (0i64..1_000_000, 1i64..1_000).prop_map(|(price, quantity)| {
        CartLine::new(Uuid::new_v4(), price, quantity)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn subtotal_is_the_exact_sum(lines in prop::collection::vec(line_strategy(), 1..20)) {
        let expected: i128 = lines
            .iter()
            .map(|l| i128::from(l.unit_price_minor_units) * i128::from(l.quantity))
            .sum();
        let subtotal = pricing::subtotal(&lines).unwrap();
        prop_assert_eq!(i128::from(subtotal), expected);
    }

    #[test]
    fn discount_is_bounded_and_rounded_half_up(total in 0i64..10_000_000_000, pct in 0u8..=100) {
        let discount = pricing::discount_amount(total, pct).unwrap();
        prop_assert!(discount >= 0);
        prop_assert!(discount <= total);

        // within half a minor unit of the exact value, ties rounding up
        let exact_x100 = i128::from(total) * i128::from(pct);
        let diff = i128::from(discount) * 100 - exact_x100;
        prop_assert!((-49..=50).contains(&diff), "diff {} for {} at {}%", diff, total, pct);

        let charged = pricing::apply_discount(total, pct).unwrap();
        prop_assert_eq!(charged + discount, total);
    }

    #[test]
    fn larger_percent_never_charges_more(total in 0i64..10_000_000, a in 0u8..=100, b in 0u8..=100) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            pricing::apply_discount(total, high).unwrap() <= pricing::apply_discount(total, low).unwrap()
        );
    }

    #[test]
    fn overflowing_carts_are_rejected_not_wrapped(quantity in 2i64..1_000) {
        let lines = vec![CartLine::new(Uuid::new_v4(), i64::MAX / 2 + 1, quantity)];
        prop_assert!(pricing::subtotal(&lines).is_err());
    }

    #[test]
    fn adding_the_same_product_merges_quantities(
        price in 1i64..100_000,
        quantities in prop::collection::vec(1i64..50, 1..10),
    ) {
        let product = Uuid::new_v4();
        let mut items = Vec::new();
        for q in &quantities {
            items = cart::add_item(items, CartLine::new(product, price, *q)).unwrap();
        }
        prop_assert_eq!(items.len(), 1);
        prop_assert_eq!(items[0].quantity, quantities.iter().sum::<i64>());
    }

    #[test]
    fn signed_payloads_verify_and_tampered_ones_do_not(
        payload in prop::collection::vec(any::<u8>(), 0..512),
        ts in 1_600_000_000i64..1_900_000_000,
    ) {
        let secret = "whsec_prop";
        let sig = sign(&ts.to_string(), &payload, secret).unwrap();
        let header = format!("t={},v1={}", ts, sig);
        prop_assert!(verify_signature(&header, &payload, secret, 300, ts).is_ok());

        let mut tampered = payload.clone();
        tampered.push(b'x');
        prop_assert!(verify_signature(&header, &tampered, secret, 300, ts).is_err());
    }
}

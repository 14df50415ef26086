//! Structural and cross-field checks on a decoded [`Order`].
//!
//! [`validate`] is pure and never short-circuits: every violated rule is
//! collected so a dead-lettered message carries one combined report.

use thiserror::Error;

use crate::types::{Delivery, Email, Item, Order, Payment};

/// A decoded order broke one or more rules.
///
/// Displayed as `bad_message: <rule>; <rule>; ...`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bad_message: {}", .violations.join("; "))]
pub struct ValidationError {
    violations: Vec<String>,
}

impl ValidationError {
    /// The violated rules, in check order.
    #[must_use]
    pub fn violations(&self) -> &[String] {
        &self.violations
    }
}

/// Check every invariant of the order aggregate.
///
/// # Errors
///
/// Returns a [`ValidationError`] listing all violated rules.
pub fn validate(order: &Order) -> Result<(), ValidationError> {
    let mut violations = Vec::new();

    check_order(&mut violations, order);
    check_delivery(&mut violations, &order.delivery);
    check_payment(&mut violations, &order.payment, &order.order_uid);
    for (index, item) in order.items.iter().enumerate() {
        check_item(&mut violations, index, item, &order.track_number);
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn require(violations: &mut Vec<String>, value: &str, field: &str) {
    if is_blank(value) {
        violations.push(format!("{field} is required"));
    }
}

fn check_order(violations: &mut Vec<String>, order: &Order) {
    require(violations, &order.order_uid, "order_uid");
    require(violations, &order.track_number, "track_number");
    require(violations, &order.entry, "entry");
    require(violations, &order.delivery_service, "delivery_service");

    // Missing timestamps decode to the epoch.
    if order.date_created.timestamp() <= 0 {
        violations.push("date_created is required".to_owned());
    }
}

fn check_delivery(violations: &mut Vec<String>, delivery: &Delivery) {
    require(violations, &delivery.name, "delivery.name");
    require(violations, &delivery.phone, "delivery.phone");
    require(violations, &delivery.zip, "delivery.zip");
    require(violations, &delivery.city, "delivery.city");
    require(violations, &delivery.address, "delivery.address");
    require(violations, &delivery.region, "delivery.region");

    if is_blank(&delivery.email) {
        violations.push("delivery.email is required".to_owned());
    } else if let Err(e) = Email::parse(&delivery.email) {
        violations.push(format!("delivery.email has invalid format: {e}"));
    }
}

fn check_payment(violations: &mut Vec<String>, payment: &Payment, order_uid: &str) {
    require(violations, &payment.transaction, "payment.transaction");
    if payment.transaction != order_uid {
        violations.push("payment.transaction must equal order_uid".to_owned());
    }
    require(violations, &payment.currency, "payment.currency");
    require(violations, &payment.provider, "payment.provider");

    if payment.payment_dt <= 0 {
        violations.push("payment.payment_dt must be positive".to_owned());
    }

    let amounts = [
        (payment.amount, "payment.amount"),
        (payment.delivery_cost, "payment.delivery_cost"),
        (payment.goods_total, "payment.goods_total"),
        (payment.custom_fee, "payment.custom_fee"),
    ];
    for (value, field) in amounts {
        if value < 0 {
            violations.push(format!("{field} must be >= 0"));
        }
    }
}

fn check_item(violations: &mut Vec<String>, index: usize, item: &Item, track_number: &str) {
    let prefix = format!("items[{index}]");

    if item.chrt_id <= 0 {
        violations.push(format!("{prefix}: chrt_id must be > 0"));
    }
    if is_blank(&item.track_number) {
        violations.push(format!("{prefix}: track_number is required"));
    }
    if item.price < 0 {
        violations.push(format!("{prefix}: price must be >= 0"));
    }
    if is_blank(&item.rid) {
        violations.push(format!("{prefix}: rid is required"));
    }
    if is_blank(&item.name) {
        violations.push(format!("{prefix}: name is required"));
    }
    if item.sale < 0 {
        violations.push(format!("{prefix}: sale must be >= 0"));
    }
    if item.total_price < 0 {
        violations.push(format!("{prefix}: total_price must be >= 0"));
    }
    if item.nm_id <= 0 {
        violations.push(format!("{prefix}: nm_id must be > 0"));
    }
    if item.track_number != track_number {
        violations.push(format!(
            "{prefix}: track_number must equal order.track_number"
        ));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn valid_order() -> Order {
        Order {
            order_uid: "b563feb7b2b84b6test".to_owned(),
            track_number: "WBILMTESTTRACK".to_owned(),
            entry: "WBIL".to_owned(),
            delivery: Delivery {
                name: "Test Testov".to_owned(),
                phone: "+9720000000".to_owned(),
                zip: "2639809".to_owned(),
                city: "Kiryat Mozkin".to_owned(),
                address: "Ploshad Mira 15".to_owned(),
                region: "Kraiot".to_owned(),
                email: "test@gmail.com".to_owned(),
            },
            payment: Payment {
                transaction: "b563feb7b2b84b6test".to_owned(),
                request_id: "req123".to_owned(),
                currency: "USD".to_owned(),
                provider: "wbpay".to_owned(),
                amount: 1817,
                payment_dt: 1_637_907_727,
                bank: "alpha".to_owned(),
                delivery_cost: 1500,
                goods_total: 317,
                custom_fee: 0,
            },
            items: vec![Item {
                chrt_id: 9_934_930,
                track_number: "WBILMTESTTRACK".to_owned(),
                price: 453,
                rid: "ab4219087a764ae0btest".to_owned(),
                name: "Mascaras".to_owned(),
                sale: 30,
                size: "0".to_owned(),
                total_price: 317,
                nm_id: 2_389_212,
                brand: "Vivienne Sabo".to_owned(),
                status: 202,
            }],
            locale: "en".to_owned(),
            internal_signature: String::new(),
            customer_id: "test".to_owned(),
            delivery_service: "meest".to_owned(),
            shardkey: "9".to_owned(),
            sm_id: 99,
            date_created: Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap(),
            oof_shard: "1".to_owned(),
        }
    }

    fn violations_of(order: &Order) -> Vec<String> {
        validate(order).unwrap_err().violations().to_vec()
    }

    #[test]
    fn test_valid_order_passes() {
        assert!(validate(&valid_order()).is_ok());
    }

    #[test]
    fn test_transaction_must_equal_order_uid() {
        let mut order = valid_order();
        order.payment.transaction = "someone-else".to_owned();

        let err = validate(&order).unwrap_err();
        assert_eq!(err.violations(), ["payment.transaction must equal order_uid"]);
        assert!(
            err.to_string()
                .contains("payment.transaction must equal order_uid")
        );
    }

    #[test]
    fn test_blank_order_fields() {
        let mut order = valid_order();
        order.track_number = "   ".to_owned();
        order.entry = String::new();
        order.delivery_service = String::new();
        order.items.clear();

        let violations = violations_of(&order);
        assert_eq!(
            violations,
            [
                "track_number is required",
                "entry is required",
                "delivery_service is required",
            ]
        );
    }

    #[test]
    fn test_blank_uid_also_breaks_transaction_match() {
        let mut order = valid_order();
        order.order_uid = String::new();

        let violations = violations_of(&order);
        assert!(violations.contains(&"order_uid is required".to_owned()));
        assert!(violations.contains(&"payment.transaction must equal order_uid".to_owned()));
    }

    #[test]
    fn test_unset_date_created() {
        let mut order = valid_order();
        order.date_created = chrono::DateTime::default();
        assert_eq!(violations_of(&order), ["date_created is required"]);
    }

    #[test]
    fn test_delivery_email() {
        let mut order = valid_order();
        order.delivery.email = String::new();
        assert_eq!(violations_of(&order), ["delivery.email is required"]);

        order.delivery.email = "not-an-address".to_owned();
        let violations = violations_of(&order);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].starts_with("delivery.email has invalid format"));
    }

    #[test]
    fn test_delivery_email_must_be_an_address() {
        let mut order = valid_order();
        for email in [
            "a<b>@c.d",
            "x,y@z.com",
            "a(b)@c.d",
            "foo@-bar-.com",
            "a@b\\c.d",
        ] {
            order.delivery.email = email.to_owned();
            let violations = violations_of(&order);
            assert_eq!(violations.len(), 1, "{email}");
            assert!(
                violations[0].starts_with("delivery.email has invalid format"),
                "{email}"
            );
        }

        for email in ["Test Testov <test@gmail.com>", "<test@gmail.com>"] {
            order.delivery.email = email.to_owned();
            assert!(validate(&order).is_ok(), "{email}");
        }
    }

    #[test]
    fn test_delivery_required_fields() {
        let mut order = valid_order();
        order.delivery = Delivery {
            email: "test@gmail.com".to_owned(),
            ..Delivery::default()
        };

        assert_eq!(
            violations_of(&order),
            [
                "delivery.name is required",
                "delivery.phone is required",
                "delivery.zip is required",
                "delivery.city is required",
                "delivery.address is required",
                "delivery.region is required",
            ]
        );
    }

    #[test]
    fn test_payment_amounts() {
        let mut order = valid_order();
        order.payment.payment_dt = 0;
        order.payment.amount = -1;
        order.payment.delivery_cost = -1;
        order.payment.goods_total = -1;
        order.payment.custom_fee = -1;

        assert_eq!(
            violations_of(&order),
            [
                "payment.payment_dt must be positive",
                "payment.amount must be >= 0",
                "payment.delivery_cost must be >= 0",
                "payment.goods_total must be >= 0",
                "payment.custom_fee must be >= 0",
            ]
        );
    }

    #[test]
    fn test_item_rules_are_indexed() {
        let mut order = valid_order();
        let mut second = order.items[0].clone();
        second.chrt_id = 0;
        second.nm_id = -5;
        second.track_number = "OTHERTRACK".to_owned();
        order.items.push(second);

        assert_eq!(
            violations_of(&order),
            [
                "items[1]: chrt_id must be > 0",
                "items[1]: nm_id must be > 0",
                "items[1]: track_number must equal order.track_number",
            ]
        );
    }

    #[test]
    fn test_item_blank_and_negative_fields() {
        let mut order = valid_order();
        let item = &mut order.items[0];
        item.price = -1;
        item.rid = String::new();
        item.name = " ".to_owned();
        item.sale = -1;
        item.total_price = -1;

        assert_eq!(
            violations_of(&order),
            [
                "items[0]: price must be >= 0",
                "items[0]: rid is required",
                "items[0]: name is required",
                "items[0]: sale must be >= 0",
                "items[0]: total_price must be >= 0",
            ]
        );
    }

    #[test]
    fn test_all_violations_are_reported_together() {
        let err = validate(&Order::default()).unwrap_err();
        // Nothing short-circuits: order, delivery and payment rules all fire.
        assert!(err.violations().len() > 10);
        assert!(err.to_string().starts_with("bad_message: order_uid is required; "));
    }
}

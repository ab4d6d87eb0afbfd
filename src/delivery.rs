//! Keyword heuristics that flag shipping and order e-mails.
//!
//! Matching runs over the lower-cased subject, sender and body, with HTML
//! bodies rendered to plain text first.
//! A phrase only counts when it is not glued to surrounding letters or
//! digits, so "groups" does not match "ups".

use mailparse::MailAddr;
use serde::Serialize;

use crate::domain::email::{BodyFormat, MessageSummary};
use crate::mail::decoders::html_to_plain;

const SENDER_DOMAINS: &[(&str, &str)] = &[
    ("ups.com", "UPS"),
    ("fedex.com", "FedEx"),
    ("usps.com", "USPS"),
    ("dhl.com", "DHL"),
    ("ontrac.com", "OnTrac"),
    ("lasership.com", "LaserShip"),
    ("amazon.com", "Amazon"),
    ("walmart.com", "Walmart"),
    ("ebay.com", "eBay"),
    ("bestbuy.com", "Best Buy"),
    ("target.com", "Target"),
    ("shopify.com", "Shopify"),
    ("etsy.com", "Etsy"),
    ("newegg.com", "Newegg"),
];

const ORDER_PHRASES: &[&str] = &[
    "order confirmation",
    "order #",
    "order number",
    "order placed",
    "order details",
    "estimated delivery",
    "delivery date",
    "order has been",
    "your order",
    "shipping details",
];

const PLATFORMS: &[&str] = &[
    "amazon", "walmart", "ebay", "bestbuy", "target", "shopify", "etsy", "newegg",
];

const SERVICES: &[&str] = &[
    "fedex",
    "ups",
    "usps",
    "dhl",
    "ontrac",
    "lasership",
    "amazon delivery",
    "express delivery",
    "priority mail",
    "tracking number",
];

const KEYWORDS: &[&str] = &[
    "shipped",
    "delivered",
    "arriving",
    "package",
    "delivery status",
    "shipment",
    "shipping confirmation",
    "tracking info",
    "out for delivery",
    "expected delivery",
];

/// Carrier names recognized in text, with their display form.
const CARRIERS: &[(&str, &str)] = &[
    ("fedex", "FedEx"),
    ("ups", "UPS"),
    ("usps", "USPS"),
    ("dhl", "DHL"),
    ("ontrac", "OnTrac"),
    ("lasership", "LaserShip"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryRule {
    SenderDomain,
    OrderPhrase,
    ShoppingPlatform,
    DeliveryService,
    DeliveryKeyword,
}

impl DeliveryRule {
    pub const ALL: [DeliveryRule; 5] = [
        DeliveryRule::SenderDomain,
        DeliveryRule::OrderPhrase,
        DeliveryRule::ShoppingPlatform,
        DeliveryRule::DeliveryService,
        DeliveryRule::DeliveryKeyword,
    ];

    /// Same spelling as the JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryRule::SenderDomain => "sender_domain",
            DeliveryRule::OrderPhrase => "order_phrase",
            DeliveryRule::ShoppingPlatform => "shopping_platform",
            DeliveryRule::DeliveryService => "delivery_service",
            DeliveryRule::DeliveryKeyword => "delivery_keyword",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|rule| rule.as_str() == name)
    }
}

/// Why a message was flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryHint {
    pub rule: DeliveryRule,
    /// The phrase or sender domain that triggered the rule.
    pub matched: String,
    pub carrier: Option<&'static str>,
}

pub fn matches_delivery(message: &MessageSummary) -> bool {
    classify(message).is_some()
}

/// First rule that fires, checked in order: sender domain, order phrases,
/// shopping platforms, delivery services, general keywords.
pub fn classify(message: &MessageSummary) -> Option<DeliveryHint> {
    let text = searchable_text(message);
    let carrier = CARRIERS
        .iter()
        .find(|(needle, _)| contains_phrase(&text, needle))
        .map(|(_, name)| *name);

    if let Some((domain, name)) = sender_domain(&message.sender).and_then(|d| known_domain(&d)) {
        let carrier = if CARRIERS.iter().any(|(_, c)| *c == name) {
            Some(name)
        } else {
            carrier
        };
        return Some(DeliveryHint {
            rule: DeliveryRule::SenderDomain,
            matched: domain.to_string(),
            carrier,
        });
    }

    let rules = [
        (DeliveryRule::OrderPhrase, ORDER_PHRASES),
        (DeliveryRule::ShoppingPlatform, PLATFORMS),
        (DeliveryRule::DeliveryService, SERVICES),
        (DeliveryRule::DeliveryKeyword, KEYWORDS),
    ];
    rules.into_iter().find_map(|(rule, phrases)| {
        phrases
            .iter()
            .find(|p| contains_phrase(&text, p))
            .map(|p| DeliveryHint {
                rule,
                matched: (*p).to_string(),
                carrier,
            })
    })
}

/// Lower-cased, whitespace-collapsed subject, sender and body.
fn searchable_text(message: &MessageSummary) -> String {
    let body = match message.body_format {
        BodyFormat::Html => html_to_plain(&message.body),
        BodyFormat::Plain => message.body.clone(),
    };
    let joined = format!("{} {} {}", message.subject, message.sender, body);
    joined
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let needs_left = phrase.chars().next().is_some_and(char::is_alphanumeric);
    let needs_right = phrase.chars().last().is_some_and(char::is_alphanumeric);

    haystack.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let left_ok = !needs_left
            || !haystack[..start]
                .chars()
                .next_back()
                .is_some_and(char::is_alphanumeric);
        let right_ok = !needs_right || !haystack[end..].chars().next().is_some_and(char::is_alphanumeric);
        left_ok && right_ok
    })
}

fn sender_domain(sender: &str) -> Option<String> {
    let address = match mailparse::addrparse(sender) {
        Ok(list) => list.iter().find_map(|addr| match addr {
            MailAddr::Single(info) => Some(info.addr.clone()),
            MailAddr::Group(group) => group.addrs.first().map(|info| info.addr.clone()),
        }),
        Err(_) => None,
    }
    .or_else(|| {
        sender
            .split(|c: char| c.is_whitespace() || c == '<' || c == '>')
            .find(|part| part.contains('@'))
            .map(str::to_string)
    })?;

    let (_, domain) = address.rsplit_once('@')?;
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    (!domain.is_empty()).then_some(domain)
}

fn known_domain(domain: &str) -> Option<(&'static str, &'static str)> {
    SENDER_DOMAINS.iter().copied().find(|(known, _)| {
        domain == *known
            || domain
                .strip_suffix(known)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

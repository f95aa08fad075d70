// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Catalog query builder and e-pharmacy search links.
//!
//! Turns an extracted medication item into a shopping query and a set of
//! deterministic search URLs. Nothing here holds state or fails at runtime.

use crate::models::MedicationItem;
use serde::Serialize;
use std::str::FromStr;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Queries shorter than this are considered too weak to search with.
pub const MIN_QUERY_LEN: usize = 3;

/// Supported e-pharmacy stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Store {
    OneMg,
    PharmEasy,
    Netmeds,
    Apollo247,
}

impl Store {
    /// All stores, in the order alternates are listed.
    pub const ALL: [Store; 4] = [
        Store::OneMg,
        Store::PharmEasy,
        Store::Netmeds,
        Store::Apollo247,
    ];

    /// Display name shown to users.
    pub fn name(&self) -> &'static str {
        match self {
            Store::OneMg => "1mg",
            Store::PharmEasy => "PharmEasy",
            Store::Netmeds => "Netmeds",
            Store::Apollo247 => "Apollo 24|7",
        }
    }

    fn search_prefix(&self) -> &'static str {
        match self {
            Store::OneMg => "https://www.1mg.com/search/all?name=",
            Store::PharmEasy => "https://pharmeasy.in/search/all?name=",
            Store::Netmeds => "https://www.netmeds.com/catalogsearch/result?q=",
            Store::Apollo247 => "https://www.apollo247.com/medicines?search=",
        }
    }

    /// Search URL for `query`, percent-encoded.
    pub fn search_url(&self, query: &str) -> String {
        format!("{}{}", self.search_prefix(), urlencoding::encode(query))
    }
}

impl FromStr for Store {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1mg" | "onemg" => Ok(Store::OneMg),
            "pharmeasy" => Ok(Store::PharmEasy),
            "netmeds" => Ok(Store::Netmeds),
            "apollo" | "apollo247" => Ok(Store::Apollo247),
            other => Err(format!("unknown store '{}'", other)),
        }
    }
}

/// One store search link.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StoreLink {
    pub store: String,
    pub url: String,
}

/// Primary link plus alternates for a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct BuyLinks {
    pub primary: StoreLink,
    pub alts: Vec<StoreLink>,
}

/// Trim and collapse internal whitespace to single spaces.
pub fn clean(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn join_present(parts: &[Option<&String>]) -> String {
    parts
        .iter()
        .flatten()
        .map(|part| clean(part))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derive a search query from an item.
///
/// Precedence: generic name, then brand name (each joined with strength
/// and form), then the raw transcription.
pub fn build_query(item: &MedicationItem) -> String {
    let strength = item.strength.as_ref();
    let form = item.form.as_ref();

    for name in [item.generic_name.as_ref(), item.brand_name.as_ref()] {
        if name.map(|n| !clean(n).is_empty()).unwrap_or(false) {
            return join_present(&[name, strength, form]);
        }
    }

    clean(&item.raw_name)
}

/// Whether a query is too weak to search with.
pub fn needs_fallback(query: &str) -> bool {
    query.chars().count() < MIN_QUERY_LEN
}

/// Build the primary search link and alternates for a query.
pub fn build_buy_links(primary: Store, query: &str) -> BuyLinks {
    let link = |store: Store| StoreLink {
        store: store.name().to_string(),
        url: store.search_url(query),
    };

    BuyLinks {
        primary: link(primary),
        alts: Store::ALL
            .into_iter()
            .filter(|store| *store != primary)
            .map(link)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_name_takes_precedence() {
        let item = MedicationItem {
            raw_name: "Crocin".to_string(),
            generic_name: Some("Paracetamol".to_string()),
            brand_name: Some("Crocin".to_string()),
            strength: Some("500 mg".to_string()),
            form: Some("tablet".to_string()),
            ..Default::default()
        };

        assert_eq!(build_query(&item), "Paracetamol 500 mg tablet");
    }

    #[test]
    fn test_raw_name_only() {
        assert_eq!(build_query(&MedicationItem::new("Crocin")), "Crocin");
    }

    #[test]
    fn test_brand_used_when_generic_blank() {
        let item = MedicationItem {
            raw_name: "Aug 625".to_string(),
            generic_name: Some("   ".to_string()),
            brand_name: Some("  Augmentin ".to_string()),
            strength: Some("625  mg".to_string()),
            ..Default::default()
        };

        assert_eq!(build_query(&item), "Augmentin 625 mg");
    }

    #[test]
    fn test_whitespace_is_collapsed() {
        assert_eq!(build_query(&MedicationItem::new("  Dolo \t 650\n")), "Dolo 650");
        assert_eq!(build_query(&MedicationItem::new("")), "");
    }

    #[test]
    fn test_needs_fallback() {
        assert!(needs_fallback(""));
        assert!(needs_fallback("Ab"));
        assert!(!needs_fallback("Abc"));
    }

    #[test]
    fn test_buy_links_encode_query() {
        let links = build_buy_links(Store::OneMg, "Paracetamol 500 mg");

        assert_eq!(links.primary.store, "1mg");
        assert_eq!(
            links.primary.url,
            "https://www.1mg.com/search/all?name=Paracetamol%20500%20mg"
        );
        assert_eq!(links.alts.len(), 3);
        assert!(links.alts.iter().all(|l| l.store != "1mg"));
        assert!(links.alts.iter().all(|l| l.url.ends_with("Paracetamol%20500%20mg")));
    }

    #[test]
    fn test_store_from_str() {
        assert_eq!("1mg".parse::<Store>(), Ok(Store::OneMg));
        assert_eq!("PharmEasy".parse::<Store>(), Ok(Store::PharmEasy));
        assert!("amazon".parse::<Store>().is_err());
    }
}

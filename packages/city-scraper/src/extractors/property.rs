//! Listing page extractor.
//!
//! Listing markup is described by [`ListingSelectors`]. The page is parsed
//! once, owned field text is collected, and records are built lazily from
//! that. The parsed DOM never leaves `extract`.

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::error::{ConfigError, ConfigResult, ParseError, ParseResult};
use crate::extractors::normalize::{clean_text, parse_value};
use crate::traits::extractor::{Extractor, Records};
use crate::types::{
    config::ListingSelectors,
    fetch::FetchedContent,
    record::{NaturalKey, Record},
    target::SourceKind,
};

/// Field always written first, holding the listing's natural key.
pub const PROPERTY_ID_FIELD: &str = "property_id";

/// Extracts one record per listing element.
#[derive(Debug)]
pub struct PropertyExtractor {
    root_css: String,
    root: Selector,
    listing: Selector,
    field: Selector,
    key_attr: String,
    field_attr: String,
}

impl PropertyExtractor {
    /// Compile `selectors`. Fails with `InvalidSelector` on bad CSS.
    pub fn new(selectors: &ListingSelectors) -> ConfigResult<Self> {
        Ok(Self {
            root_css: selectors.root.clone(),
            root: compile(&selectors.root)?,
            listing: compile(&selectors.listing)?,
            field: compile(&selectors.field)?,
            key_attr: selectors.key_attr.clone(),
            field_attr: selectors.field_attr.clone(),
        })
    }

    fn collect_listing(&self, listing: ElementRef<'_>) -> Option<RawListing> {
        let id = listing
            .value()
            .attr(&self.key_attr)
            .and_then(clean_text)?;

        let fields = listing
            .select(&self.field)
            .filter_map(|element| {
                let name = element.value().attr(&self.field_attr)?.trim();
                if name.is_empty() {
                    return None;
                }
                let text = element.text().collect::<String>();
                Some((name.to_string(), text))
            })
            .collect();

        Some(RawListing { id, fields })
    }
}

fn compile(css: &str) -> ConfigResult<Selector> {
    Selector::parse(css).map_err(|e| ConfigError::InvalidSelector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

/// Owned text pulled out of one listing element.
struct RawListing {
    id: String,
    fields: Vec<(String, String)>,
}

impl RawListing {
    fn into_record(self, source_url: &str) -> Record {
        let mut record = Record::new(
            NaturalKey::new(SourceKind::Property, [self.id.clone()]),
            source_url,
        )
        .with_field(PROPERTY_ID_FIELD, self.id);

        for (name, text) in self.fields {
            // The key column always mirrors the listing's id attribute
            if name == PROPERTY_ID_FIELD {
                continue;
            }
            // Absent or placeholder values leave the field out
            if let Some(value) = clean_text(&text) {
                record.set(name, parse_value(&value));
            }
        }

        record
    }
}

impl Extractor for PropertyExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::Property
    }

    fn extract(&self, content: &FetchedContent) -> ParseResult<Records> {
        let url = content.display_url();
        let document = Html::parse_document(content.text()?);

        let root = document
            .select(&self.root)
            .next()
            .ok_or_else(|| ParseError::UnrecognizedShape {
                url: url.clone(),
                reason: format!("no element matches {}", self.root_css),
            })?;

        let mut listings = Vec::new();
        for (index, element) in root.select(&self.listing).enumerate() {
            match self.collect_listing(element) {
                Some(listing) => listings.push(listing),
                None => warn!(url = %url, index, "Skipping listing without a property id"),
            }
        }

        debug!(url = %url, listings = listings.len(), "Listing page parsed");

        Ok(Records::new(
            listings
                .into_iter()
                .map(move |listing| listing.into_record(&url)),
        ))
    }

    fn name(&self) -> &str {
        "property-listings"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::listing_page;
    use crate::types::record::FieldValue;
    use url::Url;

    fn content(html: &str) -> FetchedContent {
        FetchedContent::new(
            Url::parse("https://listings.example.com/austin-tx?page=1").unwrap(),
            html.to_string(),
        )
    }

    fn extractor() -> PropertyExtractor {
        PropertyExtractor::new(&ListingSelectors::default()).unwrap()
    }

    #[test]
    fn test_extracts_listing_fields() {
        let html = listing_page(&[
            (
                "PROP-AUS-1000",
                &[
                    ("address", "1234 Oak St"),
                    ("price", "$425,000"),
                    ("bedrooms", "3"),
                    ("bathrooms", "2.5"),
                    ("zip", "78701"),
                ],
            ),
            ("PROP-AUS-1001", &[("address", "55  Elm\n Ave"), ("price", "$610,500")]),
        ]);

        let records: Vec<_> = extractor().extract(&content(&html)).unwrap().collect();

        assert_eq!(records.len(), 2);
        let first = &records[0];
        assert_eq!(first.key.value(), "PROP-AUS-1000");
        assert_eq!(first.get("property_id"), Some(&FieldValue::from("PROP-AUS-1000")));
        assert_eq!(first.get("price"), Some(&FieldValue::Integer(425_000)));
        assert_eq!(first.get("bathrooms"), Some(&FieldValue::Float(2.5)));
        assert_eq!(
            first.field_names().collect::<Vec<_>>(),
            vec!["property_id", "address", "price", "bedrooms", "bathrooms", "zip"]
        );
        assert_eq!(records[1].get("address"), Some(&FieldValue::from("55 Elm Ave")));
        assert_eq!(first.source_url, "https://listings.example.com/austin-tx?page=1");
    }

    #[test]
    fn test_id_cell_does_not_override_key() {
        let html = listing_page(&[("1042", &[("property_id", "1042"), ("price", "$99,000")])]);

        let records: Vec<_> = extractor().extract(&content(&html)).unwrap().collect();

        assert_eq!(records[0].key.value(), "1042");
        assert_eq!(records[0].get("property_id"), Some(&FieldValue::from("1042")));
        assert_eq!(
            records[0].field_names().collect::<Vec<_>>(),
            vec!["property_id", "price"]
        );
    }

    #[test]
    fn test_missing_optional_field_is_omitted() {
        let html = listing_page(&[(
            "PROP-AUS-1002",
            &[("address", "9 Pine Rd"), ("sqft", "N/A"), ("year_built", "  ")],
        )]);

        let records: Vec<_> = extractor().extract(&content(&html)).unwrap().collect();

        assert_eq!(records.len(), 1);
        assert!(records[0].has("address"));
        assert!(!records[0].has("sqft"));
        assert!(!records[0].has("year_built"));
    }

    #[test]
    fn test_listing_without_id_is_skipped() {
        let html = r#"
            <div data-listings>
              <div data-property-id=""><span data-field="address">nowhere</span></div>
              <div class="ad">Sponsored</div>
              <div data-property-id="P-2"><span data-field="address">2 Main St</span></div>
            </div>"#;

        let records: Vec<_> = extractor().extract(&content(html)).unwrap().collect();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.value(), "P-2");
    }

    #[test]
    fn test_empty_listing_container_yields_nothing() {
        let records = extractor()
            .extract(&content("<main><section data-listings></section></main>"))
            .unwrap();

        assert_eq!(records.count(), 0);
    }

    #[test]
    fn test_missing_container_is_unrecognized() {
        let err = extractor()
            .extract(&content("<html><body><h1>Access denied</h1></body></html>"))
            .unwrap_err();

        assert!(matches!(err, ParseError::UnrecognizedShape { .. }));
    }

    #[test]
    fn test_invalid_utf8_is_decode_error() {
        let bad = FetchedContent::new(
            Url::parse("https://listings.example.com/x").unwrap(),
            vec![0xff, 0xfe, 0x00],
        );

        assert!(matches!(extractor().extract(&bad), Err(ParseError::Decode { .. })));
    }

    #[test]
    fn test_custom_selectors() {
        let selectors = ListingSelectors {
            root: "table.results".into(),
            listing: "tr[data-mls]".into(),
            key_attr: "data-mls".into(),
            field: "td[data-col]".into(),
            field_attr: "data-col".into(),
        };
        let html = r#"<table class="results">
            <tr data-mls="MLS-77"><td data-col="price">$1,200</td></tr>
        </table>"#;

        let extractor = PropertyExtractor::new(&selectors).unwrap();
        let records: Vec<_> = extractor.extract(&content(html)).unwrap().collect();

        assert_eq!(records[0].key.value(), "MLS-77");
        assert_eq!(records[0].get("price"), Some(&FieldValue::Integer(1200)));
    }

    #[test]
    fn test_bad_selector_is_config_error() {
        let selectors = ListingSelectors {
            listing: "[[nope".into(),
            ..ListingSelectors::default()
        };

        let err = PropertyExtractor::new(&selectors).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSelector { .. }));
    }
}

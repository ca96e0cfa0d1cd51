//! Fixtures for tests

use crate::hierarchy::HsHierarchy;
use crate::hierarchy::weights::SectionWeightTable;
use crate::id::ClassificationCode;
use crate::nipa::NipaMapping;
use crate::tariff::{BilateralTariffs, SectionNameMap, TariffAccessor};
use map_macro::hash_map;
use rstest::fixture;
use std::rc::Rc;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

#[fixture]
pub fn classification_order() -> Vec<ClassificationCode> {
    ["c1", "c2", "c3", "c4"]
        .into_iter()
        .map(ClassificationCode::new)
        .collect()
}

#[fixture]
pub fn import_weight_json() -> &'static str {
    r#"{"direct": {"CAN": {"c1": 0.5, "c2": 0.3, "c4": 0.2}, "MEX": {"c3": 1.0}}}"#
}

#[fixture]
pub fn nipa_mapping_json() -> &'static str {
    r#"{
        "A": {"name": "Food", "layer": 0, "indices": [0, 1]},
        "B": {"name": "Fuel", "layer": 0, "indices": [2]},
        "X": {"name": "Durable goods", "layer": 1, "indices": [3, 4]},
        "Y": {"name": "Nondurable goods", "layer": 1, "indices": [5]},
        "Z": {"name": "Other", "layer": 1, "indices": [4]}
    }"#
}

#[fixture]
pub fn nipa_mapping(nipa_mapping_json: &str) -> NipaMapping {
    serde_json::from_str(nipa_mapping_json).unwrap()
}

#[fixture]
pub fn hierarchy() -> HsHierarchy {
    serde_json::from_str(
        r#"{
            "S1": {"chapters": {
                "01": {"subcategories": {"0101": {}, "0102": {}, "0103": {}}},
                "02": {"subcategories": {"0201": {}, "0202": {}}}
            }},
            "S2": {"chapters": {
                "03": {"subcategories": {"0301": {}}}
            }}
        }"#,
    )
    .unwrap()
}

#[fixture]
pub fn weight_table() -> SectionWeightTable {
    hash_map! {
        "CAN".into() => hash_map! {
            "S1".into() => hash_map! {
                "01".to_string() => 0.6,
                "0101".to_string() => 0.3,
                "0102".to_string() => 0.0,
                "0201".to_string() => 0.1,
                "0202".to_string() => 0.3,
            },
            "S2".into() => hash_map! {
                "0301".to_string() => 1.0,
            },
        },
        "MEX".into() => hash_map! {
            "S1".into() => hash_map! {
                "0101".to_string() => 0.5,
                "0102".to_string() => 0.5,
            },
        },
    }
}

#[fixture]
pub fn bilateral_tariffs() -> BilateralTariffs {
    serde_json::from_str(
        r#"{
            "CAN": {"sector_data": {"2024": {
                "Live animals": {"us_to_country": 10.0, "country_to_us": 2.0},
                "Vegetables": {"us_to_country": 5.0}
            }}},
            "MEX": {"sector_data": {"2024": {
                "Live animals": {"us_to_country": 7.5}
            }}}
        }"#,
    )
    .unwrap()
}

#[fixture]
pub fn section_names() -> SectionNameMap {
    serde_json::from_str(r#"{"S1": "Live animals", "S2": "Vegetables"}"#).unwrap()
}

#[fixture]
pub fn tariff_accessor(
    bilateral_tariffs: BilateralTariffs,
    section_names: SectionNameMap,
) -> TariffAccessor {
    TariffAccessor::new(Rc::new(bilateral_tariffs), Rc::new(section_names), "2024")
}

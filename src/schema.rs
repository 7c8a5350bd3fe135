//! Boundary shapes exchanged with the data-access layer.
//!
//! Stored rows are loose: numeric fields may be missing and ids may be
//! numbers or strings. Every such field is an `Option` here and is resolved
//! to an explicit default (0.0, empty string) before it reaches the core.

use crate::budget::{Budget, BudgetLineItem};
use crate::error::Result;
use crate::measurement::{Measurement, MeasurementItem, MeasurementSection};
use crate::period::Period;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ItemInput {
    #[serde(deserialize_with = "string_or_number")]
    #[schemars(with = "String")]
    #[schemars(description = "Item id; numeric ids are accepted and kept as text")]
    pub id: String,

    #[serde(default, alias = "nombre")]
    pub name: Option<String>,

    #[serde(default, alias = "unidad")]
    pub unit: Option<String>,

    #[serde(default, alias = "cantidad", deserialize_with = "lenient_number")]
    #[schemars(description = "Quantity; missing or non-numeric means 0")]
    pub quantity: Option<f64>,

    #[serde(
        default,
        alias = "unitPrice",
        alias = "precio",
        alias = "price",
        deserialize_with = "lenient_number"
    )]
    #[schemars(description = "Unit price; missing or non-numeric means 0")]
    pub unit_price: Option<f64>,
}

impl ItemInput {
    pub fn resolve(&self) -> BudgetLineItem {
        BudgetLineItem {
            id: self.id.clone(),
            name: self.name.clone().unwrap_or_default(),
            unit: self.unit.clone().unwrap_or_default(),
            quantity: self.quantity.unwrap_or(0.0),
            unit_price: self.unit_price.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SectionInput {
    #[serde(alias = "nombre")]
    pub name: String,

    #[serde(default)]
    pub items: Vec<ItemInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BudgetInput {
    pub id: u64,

    #[serde(default, alias = "nombre")]
    pub name: Option<String>,

    #[serde(default, alias = "secciones")]
    #[schemars(description = "Sections in display order; order drives the cumulative share")]
    pub sections: Vec<SectionInput>,
}

impl BudgetInput {
    /// Builds a budget through the regular edit operations, so duplicate
    /// ids, duplicate sections and negative amounts are rejected.
    pub fn resolve(&self) -> Result<Budget> {
        let mut budget = Budget::new(self.id, self.name.clone().unwrap_or_default());
        for section in &self.sections {
            budget.add_section(&section.name)?;
            for item in &section.items {
                budget.add_item(section.name.trim(), item.resolve())?;
            }
        }
        Ok(budget)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(BudgetInput)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MeasurementItemInput {
    #[serde(deserialize_with = "string_or_number")]
    #[schemars(with = "String")]
    pub id: String,

    #[serde(default, deserialize_with = "lenient_number")]
    pub anterior: Option<f64>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub presente: Option<f64>,

    #[serde(default, deserialize_with = "lenient_number")]
    #[schemars(description = "Defaults to anterior + presente when missing")]
    pub acumulado: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MeasurementSectionInput {
    #[serde(alias = "nombre")]
    pub name: String,

    #[serde(default)]
    pub items: Vec<MeasurementItemInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MeasurementInput {
    pub id: u64,

    #[serde(alias = "presupuesto_id")]
    pub budget_id: u64,

    #[serde(alias = "periodo")]
    #[schemars(description = "YYYY-MM, YYYY-MM-DD or an RFC 3339 timestamp")]
    pub period: String,

    #[serde(default, alias = "secciones")]
    pub sections: Vec<MeasurementSectionInput>,
}

impl MeasurementInput {
    /// Resolves defaults only; bounds are checked by the ledger on import.
    pub fn resolve(&self) -> Result<Measurement> {
        let period = Period::parse(&self.period)?;
        let sections = self
            .sections
            .iter()
            .map(|section| MeasurementSection {
                name: section.name.clone(),
                items: section
                    .items
                    .iter()
                    .map(|item| {
                        let anterior = item.anterior.unwrap_or(0.0);
                        let presente = item.presente.unwrap_or(0.0);
                        MeasurementItem {
                            id: item.id.clone(),
                            anterior,
                            presente,
                            acumulado: item.acumulado.unwrap_or(anterior + presente),
                        }
                    })
                    .collect(),
            })
            .collect();

        Ok(Measurement {
            id: self.id,
            budget_id: self.budget_id,
            period,
            sections,
        })
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(MeasurementInput)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

/// Numbers, numeric strings ("12.5") and null are accepted; anything that
/// does not read as a finite number becomes `None` instead of an error.
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let number = match value {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| n.is_finite()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = BudgetInput::schema_as_json().unwrap();
        assert!(schema_json.contains("sections"));
        assert!(schema_json.contains("unit_price"));

        let schema_json = MeasurementInput::schema_as_json().unwrap();
        assert!(schema_json.contains("acumulado"));
    }

    #[test]
    fn test_lenient_budget_input() {
        let json = r#"{
            "id": 1,
            "nombre": "Escuela",
            "secciones": [
                {"nombre": "Trabajos preliminares", "items": [
                    {"id": 101, "nombre": "Cartel de obra", "unidad": "u", "cantidad": 1, "unitPrice": 5000},
                    {"id": "102", "name": "Limpieza"}
                ]},
                {"name": "Vacía"}
            ]
        }"#;
        let input: BudgetInput = serde_json::from_str(json).unwrap();
        let budget = input.resolve().unwrap();

        assert_eq!(budget.name, "Escuela");
        assert_eq!(budget.sections.len(), 2);
        let (_, cartel) = budget.find_item("101").unwrap();
        assert_eq!(cartel.total(), 5000.0);
        let (_, limpieza) = budget.find_item("102").unwrap();
        assert_eq!((limpieza.quantity, limpieza.unit_price), (0.0, 0.0));
        assert_eq!(limpieza.unit, "");
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let json = r#"{"id": 1, "sections": [{"name": "A", "items": [
            {"id": "x", "cantidad": "12.5", "precio": "100"},
            {"id": "y", "quantity": "abc", "price": 40},
            {"id": "z", "quantity": null, "unit_price": true}
        ]}]}"#;
        let input: BudgetInput = serde_json::from_str(json).unwrap();
        let budget = input.resolve().unwrap();

        let (_, x) = budget.find_item("x").unwrap();
        assert_eq!(x.total(), 1250.0);
        let (_, y) = budget.find_item("y").unwrap();
        assert_eq!((y.quantity, y.unit_price), (0.0, 40.0));
        let (_, z) = budget.find_item("z").unwrap();
        assert_eq!((z.quantity, z.unit_price), (0.0, 0.0));
    }

    #[test]
    fn test_measurement_numeric_strings_are_coerced() {
        let json = r#"{"id": 4, "budget_id": 1, "period": "2024-06", "sections": [
            {"name": "A", "items": [{"id": "x", "anterior": "20.5", "presente": "n/a"}]}
        ]}"#;
        let input: MeasurementInput = serde_json::from_str(json).unwrap();
        let item = input.resolve().unwrap().item("x").unwrap().clone();
        assert_eq!((item.anterior, item.presente, item.acumulado), (20.5, 0.0, 20.5));
    }

    #[test]
    fn test_budget_input_rejects_duplicate_ids() {
        let json = r#"{"id": 1, "sections": [
            {"name": "A", "items": [{"id": "x", "quantity": 1, "unit_price": 1}]},
            {"name": "B", "items": [{"id": "x", "quantity": 1, "unit_price": 1}]}
        ]}"#;
        let input: BudgetInput = serde_json::from_str(json).unwrap();
        assert!(input.resolve().is_err());
    }

    #[test]
    fn test_measurement_input_defaults() {
        let json = r#"{
            "id": 3,
            "presupuesto_id": 1,
            "periodo": "2024-05-01T03:00:00.000Z",
            "secciones": [{"nombre": "A", "items": [
                {"id": 101, "anterior": 20, "presente": 15},
                {"id": "102"}
            ]}]
        }"#;
        let input: MeasurementInput = serde_json::from_str(json).unwrap();
        let measurement = input.resolve().unwrap();

        assert_eq!(measurement.period, Period::new(2024, 5).unwrap());
        assert_eq!(measurement.item("101").unwrap().acumulado, 35.0);
        assert_eq!(measurement.item("102").unwrap().acumulado, 0.0);
    }

    #[test]
    fn test_measurement_input_bad_period() {
        let input = MeasurementInput {
            id: 1,
            budget_id: 1,
            period: "mayo".to_string(),
            sections: vec![],
        };
        assert!(input.resolve().is_err());
    }
}

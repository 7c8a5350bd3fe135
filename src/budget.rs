use crate::arithmetic::item_total;
use crate::error::{CertificationError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BudgetLineItem {
    #[schemars(description = "Stable identifier, unique within the budget")]
    pub id: String,

    pub name: String,

    #[schemars(description = "Unit of measure (m2, m3, gl, u, ...)")]
    pub unit: String,

    pub quantity: f64,

    pub unit_price: f64,
}

impl BudgetLineItem {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        unit: impl Into<String>,
        quantity: f64,
        unit_price: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            unit: unit.into(),
            quantity,
            unit_price,
        }
    }

    /// Always derived from quantity and unit price.
    pub fn total(&self) -> f64 {
        item_total(self.quantity, self.unit_price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BudgetSection {
    pub name: String,
    pub items: Vec<BudgetLineItem>,
}

impl BudgetSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn total(&self) -> f64 {
        self.items.iter().map(BudgetLineItem::total).sum()
    }
}

/// A "presupuesto": named sections of priced line items, in declaration
/// order. Section order is significant for the cumulative share (iacum).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Budget {
    pub id: u64,
    pub name: String,
    pub sections: Vec<BudgetSection>,
}

impl Budget {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            sections: Vec::new(),
        }
    }

    pub fn grand_total(&self) -> f64 {
        self.sections.iter().map(BudgetSection::total).sum()
    }

    pub fn section(&self, name: &str) -> Option<&BudgetSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Every item with the name of the section it belongs to, in order.
    pub fn items(&self) -> impl Iterator<Item = (&str, &BudgetLineItem)> {
        self.sections
            .iter()
            .flat_map(|s| s.items.iter().map(move |item| (s.name.as_str(), item)))
    }

    pub fn find_item(&self, item_id: &str) -> Option<(&str, &BudgetLineItem)> {
        self.items().find(|(_, item)| item.id == item_id)
    }

    pub fn item_count(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }

    pub fn add_section(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CertificationError::validation(
                "section",
                "Section name cannot be empty",
            ));
        }
        if self.section(name).is_some() {
            return Err(CertificationError::validation(
                name,
                "A section with this name already exists",
            ));
        }
        self.sections.push(BudgetSection::new(name));
        Ok(())
    }

    pub fn remove_section(&mut self, name: &str) -> Result<BudgetSection> {
        let idx = self.section_index(name)?;
        Ok(self.sections.remove(idx))
    }

    pub fn rename_section(&mut self, name: &str, new_name: &str) -> Result<()> {
        let new_name = new_name.trim();
        let idx = self.section_index(name)?;
        if new_name.is_empty() {
            return Err(CertificationError::validation(
                name,
                "Section name cannot be empty",
            ));
        }
        if new_name != name && self.section(new_name).is_some() {
            return Err(CertificationError::validation(
                new_name,
                "A section with this name already exists",
            ));
        }
        self.sections[idx].name = new_name.to_string();
        Ok(())
    }

    /// Appends `item` to `section`, creating the section at the end when it
    /// does not exist yet.
    pub fn add_item(&mut self, section: &str, item: BudgetLineItem) -> Result<()> {
        if item.id.trim().is_empty() {
            return Err(CertificationError::validation(
                &item.name,
                "Item id cannot be empty",
            ));
        }
        if self.find_item(&item.id).is_some() {
            return Err(CertificationError::validation(
                &item.id,
                "An item with this id already exists in the budget",
            ));
        }
        check_amount(&item.id, "quantity", item.quantity)?;
        check_amount(&item.id, "unit price", item.unit_price)?;

        if self.section(section).is_none() {
            self.add_section(section)?;
        }
        let idx = self.section_index(section.trim())?;
        self.sections[idx].items.push(item);
        Ok(())
    }

    pub fn remove_item(&mut self, item_id: &str) -> Result<BudgetLineItem> {
        let (section_idx, item_idx) = self.item_position(item_id)?;
        Ok(self.sections[section_idx].items.remove(item_idx))
    }

    pub fn set_quantity(&mut self, item_id: &str, quantity: f64) -> Result<()> {
        check_amount(item_id, "quantity", quantity)?;
        self.item_mut(item_id)?.quantity = quantity;
        Ok(())
    }

    pub fn set_unit_price(&mut self, item_id: &str, unit_price: f64) -> Result<()> {
        check_amount(item_id, "unit price", unit_price)?;
        self.item_mut(item_id)?.unit_price = unit_price;
        Ok(())
    }

    /// Moves an item to the end of another existing section.
    pub fn move_item(&mut self, item_id: &str, target_section: &str) -> Result<()> {
        let target_idx = self.section_index(target_section)?;
        let (section_idx, item_idx) = self.item_position(item_id)?;
        if section_idx == target_idx {
            return Ok(());
        }
        let item = self.sections[section_idx].items.remove(item_idx);
        self.sections[target_idx].items.push(item);
        Ok(())
    }

    /// Checks structural invariants for a budget built outside the edit
    /// operations (e.g. deserialized).
    pub fn validate(&self) -> Result<()> {
        let mut section_names = HashSet::new();
        let mut item_ids = HashSet::new();

        for section in &self.sections {
            if !section_names.insert(section.name.as_str()) {
                return Err(CertificationError::validation(
                    &section.name,
                    "Duplicate section name",
                ));
            }
            for item in &section.items {
                if !item_ids.insert(item.id.as_str()) {
                    return Err(CertificationError::validation(
                        &item.id,
                        "Duplicate item id",
                    ));
                }
                check_amount(&item.id, "quantity", item.quantity)?;
                check_amount(&item.id, "unit price", item.unit_price)?;
            }
        }

        Ok(())
    }

    fn section_index(&self, name: &str) -> Result<usize> {
        self.sections
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| CertificationError::SectionNotFound(name.to_string()))
    }

    fn item_position(&self, item_id: &str) -> Result<(usize, usize)> {
        for (section_idx, section) in self.sections.iter().enumerate() {
            if let Some(item_idx) = section.items.iter().position(|i| i.id == item_id) {
                return Ok((section_idx, item_idx));
            }
        }
        Err(CertificationError::ItemNotFound(item_id.to_string()))
    }

    fn item_mut(&mut self, item_id: &str) -> Result<&mut BudgetLineItem> {
        let (section_idx, item_idx) = self.item_position(item_id)?;
        Ok(&mut self.sections[section_idx].items[item_idx])
    }
}

fn check_amount(item_id: &str, field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(CertificationError::validation(
            item_id,
            format!("{} must be a finite, non-negative number (got {})", field, value),
        ));
    }
    Ok(())
}

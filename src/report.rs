use crate::certificate::Certificate;
use crate::chain::ChainLinks;
use crate::period::Period;
use serde::{Deserialize, Serialize};

/// Formats with '.' as thousands separator and ',' as decimal mark
/// (es-AR). Non-finite values render as "-".
pub fn format_number(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }

    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let negative = value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push(',');
        out.push_str(frac);
    }
    out
}

pub fn format_currency(amount: f64) -> String {
    if !amount.is_finite() {
        return "-".to_string();
    }
    let body = format_number(amount.abs(), 2);
    if amount < 0.0 && body != "0,00" {
        format!("-$ {}", body)
    } else {
        format!("$ {}", body)
    }
}

pub fn format_percentage(percent: f64) -> String {
    if !percent.is_finite() {
        return "-".to_string();
    }
    format!("{} %", format_number(percent, 2))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRow {
    pub section: String,
    pub item_id: String,
    pub name: String,
    pub unit: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub item_total: f64,
    pub acumulado: f64,
    pub certified_amount: f64,
}

/// Flat, presentation-ready view of a certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateReport {
    pub certificate_id: u64,
    pub budget_id: u64,
    pub budget_name: String,
    pub measurement_id: u64,
    pub period: Period,
    pub rows: Vec<ReportRow>,
    pub grand_total: f64,
    pub total_certified: f64,
    pub certified_percent: f64,
    pub delta: Option<f64>,
    pub previous_certificate_id: Option<u64>,
    pub next_certificate_id: Option<u64>,
}

impl CertificateReport {
    pub fn from_certificate(certificate: &Certificate, links: Option<ChainLinks>) -> Self {
        let budget = &certificate.budget_snapshot;
        let rows = certificate
            .items
            .iter()
            .map(|certified| {
                let item = budget.find_item(&certified.item_id).map(|(_, item)| item);
                ReportRow {
                    section: certified.section.clone(),
                    item_id: certified.item_id.clone(),
                    name: item.map(|i| i.name.clone()).unwrap_or_default(),
                    unit: item.map(|i| i.unit.clone()).unwrap_or_default(),
                    quantity: item.map(|i| i.quantity).unwrap_or(0.0),
                    unit_price: item.map(|i| i.unit_price).unwrap_or(0.0),
                    item_total: certified.item_total,
                    acumulado: certified.acumulado,
                    certified_amount: certified.certified_amount,
                }
            })
            .collect();

        Self {
            certificate_id: certificate.id,
            budget_id: certificate.budget_id,
            budget_name: budget.name.clone(),
            measurement_id: certificate.measurement_id,
            period: certificate.period,
            rows,
            grand_total: certificate.grand_total,
            total_certified: certificate.total_certified,
            certified_percent: certificate.certified_percent,
            delta: certificate.delta,
            previous_certificate_id: links.and_then(|l| l.previous_id),
            next_certificate_id: links.and_then(|l| l.next_id),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Machine-readable rows; amounts use plain decimal notation.
    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str(
            "Section,Item,Description,Unit,Quantity,Unit Price,Total,Acumulado,Certified Amount\n",
        );

        for row in &self.rows {
            output.push_str(&format!(
                "{},{},{},{},{},{:.2},{:.2},{:.2},{:.2}\n",
                csv_field(&row.section),
                csv_field(&row.item_id),
                csv_field(&row.name),
                csv_field(&row.unit),
                row.quantity,
                row.unit_price,
                row.item_total,
                row.acumulado,
                row.certified_amount
            ));
        }

        output
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "# Certificado N° {} - {}\n\n",
            self.certificate_id, self.budget_name
        ));
        output.push_str(&format!("**Período:** {}\n\n", self.period));

        let mut current_section: Option<&str> = None;
        let mut section_subtotal = 0.0;

        for row in &self.rows {
            if current_section != Some(row.section.as_str()) {
                if current_section.is_some() {
                    output.push_str(&format!(
                        "| | **Subtotal** | | | **{}** |\n\n",
                        format_currency(section_subtotal)
                    ));
                }
                output.push_str(&format!("## {}\n\n", row.section));
                output.push_str("| Item | Descripción | Total | Acumulado | Certificado |\n");
                output.push_str("|------|-------------|-------|-----------|-------------|\n");
                current_section = Some(row.section.as_str());
                section_subtotal = 0.0;
            }
            output.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                row.item_id,
                row.name,
                format_currency(row.item_total),
                format_percentage(row.acumulado),
                format_currency(row.certified_amount)
            ));
            section_subtotal += row.certified_amount;
        }
        if current_section.is_some() {
            output.push_str(&format!(
                "| | **Subtotal** | | | **{}** |\n\n",
                format_currency(section_subtotal)
            ));
        }

        output.push_str("## Totales\n\n");
        output.push_str(&format!(
            "- **Presupuesto:** {}\n",
            format_currency(self.grand_total)
        ));
        output.push_str(&format!(
            "- **Certificado acumulado:** {} ({})\n",
            format_currency(self.total_certified),
            format_percentage(self.certified_percent)
        ));
        if let Some(delta) = self.delta {
            output.push_str(&format!(
                "- **Certificado del período:** {}\n",
                format_currency(delta)
            ));
        }

        output
    }
}

fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

use async_trait::async_trait;
use handlebars::Handlebars;
use prescription_lifecycle::dose_schedule::DoseProgress;
use prescription_lifecycle::gateways::LetterRenderer;
use prescription_lifecycle::{GatewayResult, Prescription};
use serde_json::json;

use crate::error::EmailResult;

const LETTER_TEMPLATE: &str = "\
{{clinic}}
Prescription confirmation

Patient: {{patient_id}}
Prescription: {{prescription_id}}
Medication: {{medication}}
Current dose: {{#if dose}}{{dose}}{{else}}not scheduled{{/if}}
{{#if next_dose}}Next dose: {{next_dose}}
{{/if}}Refills remaining: {{refills_remaining}}
Signed: {{signed_at}}
{{#if replaces}}Replaces prescription: {{replaces}}
{{/if}}
Thank you for your care of this patient.";

/// Renders the letter sent to the prescriber as a single-page PDF.
pub struct TemplateLetterRenderer {
    registry: Handlebars<'static>,
    clinic_name: String,
}

impl TemplateLetterRenderer {
    pub fn new(clinic_name: impl Into<String>) -> EmailResult<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_template_string("letter", LETTER_TEMPLATE)?;
        Ok(Self {
            registry,
            clinic_name: clinic_name.into(),
        })
    }

    pub fn render_text(&self, prescription: &Prescription) -> EmailResult<String> {
        let progress = DoseProgress::resolve(&prescription.dose_schedule, prescription.refills_remaining);
        let data = json!({
            "clinic": self.clinic_name,
            "patient_id": prescription.patient_id,
            "prescription_id": prescription.id,
            "medication": prescription.medication_name,
            "dose": progress.current.map(|step| step.dose),
            "next_dose": progress.next.map(|step| step.dose),
            "refills_remaining": prescription.refills_remaining,
            "signed_at": prescription
                .signed_at
                .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "unsigned".to_string()),
            "replaces": prescription.replaces_prescription_id,
        });
        Ok(self.registry.render("letter", &data)?)
    }
}

#[async_trait]
impl LetterRenderer for TemplateLetterRenderer {
    async fn render_clinician_letter(&self, prescription: &Prescription) -> GatewayResult<Vec<u8>> {
        let text = self.render_text(prescription)?;
        Ok(text_pdf(&text))
    }
}

fn escape_pdf_text(line: &str) -> String {
    let mut escaped = String::with_capacity(line.len());
    for ch in line.chars() {
        match ch {
            '(' | ')' | '\\' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            ch if ch.is_ascii() && !ch.is_ascii_control() => escaped.push(ch),
            _ => escaped.push('?'),
        }
    }
    escaped
}

/// Minimal PDF 1.4 document with one page of Helvetica text.
pub(crate) fn text_pdf(text: &str) -> Vec<u8> {
    let mut content = String::from("BT\n/F1 11 Tf\n14 TL\n56 780 Td\n");
    for line in text.lines() {
        content.push_str(&format!("({}) Tj T*\n", escape_pdf_text(line)));
    }
    content.push_str("ET");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 842] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", index + 1, body));
    }

    let xref_at = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        pdf.push_str(&format!("{offset:010} 00000 n \n"));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    ));
    pdf.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use prescription_lifecycle::DoseStep;
    use uuid::Uuid;

    fn prescription() -> Prescription {
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap();
        let mut prescription = Prescription::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "tirzepatide",
            vec![
                DoseStep {
                    refill_number: 0,
                    dose: "2.5mg".into(),
                    billing_price_id: "price-low".into(),
                    product_variant_id: "variant-low".into(),
                },
                DoseStep {
                    refill_number: 1,
                    dose: "5mg".into(),
                    billing_price_id: "price-high".into(),
                    product_variant_id: "variant-high".into(),
                },
            ],
            1,
            now,
            now,
        );
        prescription.signed_at = Some(now);
        prescription
    }

    #[test]
    fn letter_lists_current_and_next_dose() {
        let renderer = TemplateLetterRenderer::new("Northside Clinic").unwrap();
        let text = renderer.render_text(&prescription()).unwrap();
        assert!(text.starts_with("Northside Clinic\n"));
        assert!(text.contains("Current dose: 2.5mg"));
        assert!(text.contains("Next dose: 5mg"));
        assert!(text.contains("Signed: 2024-07-01 09:00 UTC"));
        assert!(!text.contains("Replaces prescription"));
    }

    #[tokio::test]
    async fn letter_is_a_pdf() {
        let renderer = TemplateLetterRenderer::new("Clinic (North)").unwrap();
        let pdf = renderer.render_clinician_letter(&prescription()).await.unwrap();
        let text = String::from_utf8(pdf).unwrap();
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.trim_end().ends_with("%%EOF"));
        assert!(text.contains("(Clinic \\(North\\)) Tj"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let pdf = String::from_utf8(text_pdf("hello")).unwrap();
        let xref = pdf.find("xref\n").unwrap();
        let entries: Vec<usize> = pdf[xref..]
            .lines()
            .skip(3)
            .take(5)
            .map(|line| line[..10].parse().unwrap())
            .collect();
        for (index, offset) in entries.iter().enumerate() {
            assert!(pdf[*offset..].starts_with(&format!("{} 0 obj", index + 1)));
        }
    }
}

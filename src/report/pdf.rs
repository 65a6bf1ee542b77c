//! PDF rendering of a diagnosis record.
//!
//! Layout is a flat list of wrapped lines on A4 pages in built-in Helvetica.
//! Built-in PDF fonts only cover Latin-1, so text is reduced first:
//! typographic punctuation is mapped to ASCII, anything else outside
//! Latin-1 (emoji included) is dropped.

use super::DiagnosisRecord;
use crate::agents::AgentKind;
use crate::error::AppError;

pub const TITLE: &str = "MedAgent Multi-Agent Diagnosis Report";

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
const TITLE_SIZE: f32 = 14.0;
const BODY_SIZE: f32 = 11.0;
/// Characters per body line; Helvetica at 11pt averages ~5.5pt per glyph.
const WRAP_COLUMNS: usize = 85;
const PT_TO_MM: f32 = 0.3528;

/// One physical line of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub text: String,
    pub bold: bool,
    pub size: f32,
    /// Extra vertical space before this line, in mm.
    pub gap_before: f32,
}

impl Line {
    fn body(text: String) -> Self {
        Self { text, bold: false, size: BODY_SIZE, gap_before: 0.0 }
    }

    fn heading(text: String, gap_before: f32) -> Self {
        Self { text, bold: true, size: BODY_SIZE, gap_before }
    }

    fn height_mm(&self) -> f32 {
        self.size * 1.35 * PT_TO_MM + self.gap_before
    }
}

/// Reduce `s` to characters a built-in PDF font can draw.
pub fn to_latin1(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => out.push('"'),
            '\u{2010}'..='\u{2015}' | '\u{2212}' => out.push('-'),
            '\u{2022}' | '\u{25CF}' | '\u{25AA}' => out.push('*'),
            '\u{2026}' => out.push_str("..."),
            '\u{2192}' => out.push_str("->"),
            '\u{2264}' => out.push_str("<="),
            '\u{2265}' => out.push_str(">="),
            '\t' => out.push_str("    "),
            '\n' => out.push('\n'),
            c if c.is_control() => {}
            c if (c as u32) <= 0xFF => out.push(c),
            _ => {}
        }
    }
    out
}

/// Greedy word wrap at `width` characters. Words longer than a line are
/// hard-split. Blank input lines are preserved as empty lines.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let current_len = current.chars().count();
            if current_len > 0 && current_len + 1 + word.len() > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.extend(word);
        }
        lines.push(current);
    }
    lines
}

fn section(out: &mut Vec<Line>, heading: &str, body: &str, gap: f32) {
    out.push(Line::heading(heading.to_string(), gap));
    out.extend(wrap(&to_latin1(body), WRAP_COLUMNS).into_iter().map(Line::body));
}

/// Body lines of the report, in reading order (title excluded).
pub fn layout(record: &DiagnosisRecord) -> Vec<Line> {
    let mut out = Vec::new();
    out.extend(
        wrap(
            &to_latin1(&format!("Session: {}  |  {}", record.session_id, record.timestamp)),
            WRAP_COLUMNS,
        )
        .into_iter()
        .map(Line::body),
    );
    section(&mut out, "Patient Report:", &record.report_text, 4.0);

    for kind in AgentKind::ALL.into_iter().filter(|k| *k != AgentKind::MultidisciplinaryTeam) {
        section(
            &mut out,
            &format!("=== {} ===", kind.display_name()),
            record.outputs.get(kind),
            2.0,
        );
    }
    section(&mut out, "=== Final Diagnosis ===", &record.outputs.final_diagnosis, 3.0);

    for f in &record.followups {
        section(
            &mut out,
            &format!("=== Follow-up ({}) ===", f.agent.display_name()),
            &format!("Q: {}\nA: {}", f.question, f.answer),
            2.0,
        );
    }
    out
}

/// Split `lines` into pages given the usable page height in mm.
pub fn paginate(lines: Vec<Line>, first_page_mm: f32, page_mm: f32) -> Vec<Vec<Line>> {
    let mut pages = vec![Vec::new()];
    let mut remaining = first_page_mm;
    for line in lines {
        let h = line.height_mm();
        if h > remaining && !pages.last().is_some_and(|p| p.is_empty()) {
            pages.push(Vec::new());
            remaining = page_mm;
        }
        remaining -= h;
        if let Some(page) = pages.last_mut() {
            page.push(line);
        }
    }
    pages
}

/// Render `record` to PDF bytes.
#[cfg(feature = "pdf")]
pub fn render(record: &DiagnosisRecord) -> Result<Vec<u8>, AppError> {
    use printpdf::{BuiltinFont, Mm, PdfDocument};

    let pdf_err = |e: printpdf::Error| AppError::Pdf(e.to_string());

    let (doc, first_page, first_layer) =
        PdfDocument::new(TITLE, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_err)?;

    let title_height = TITLE_SIZE * 1.35 * PT_TO_MM + 6.0;
    let usable = PAGE_HEIGHT_MM - 2.0 * MARGIN_MM;
    let pages = paginate(layout(record), usable - title_height, usable);

    for (i, lines) in pages.into_iter().enumerate() {
        let layer = if i == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page, layer) = doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
            doc.get_page(page).get_layer(layer)
        };

        let mut y = PAGE_HEIGHT_MM - MARGIN_MM;
        if i == 0 {
            // Centred using the average glyph width estimate.
            let title_width = TITLE.len() as f32 * TITLE_SIZE * 0.55 * PT_TO_MM;
            let x = ((PAGE_WIDTH_MM - title_width) / 2.0).max(MARGIN_MM);
            y -= TITLE_SIZE * PT_TO_MM;
            layer.use_text(TITLE, TITLE_SIZE, Mm(x), Mm(y), &bold);
            y -= title_height - TITLE_SIZE * PT_TO_MM;
        }

        for line in lines {
            y -= line.height_mm();
            if line.text.is_empty() {
                continue;
            }
            let font = if line.bold { &bold } else { &regular };
            layer.use_text(line.text, line.size, Mm(MARGIN_MM), Mm(y), font);
        }
    }

    doc.save_to_bytes().map_err(pdf_err)
}

#[cfg(not(feature = "pdf"))]
pub fn render(_record: &DiagnosisRecord) -> Result<Vec<u8>, AppError> {
    Err(AppError::Pdf("this build has no PDF support (enable the `pdf` feature)".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{AgentOutputs, FollowUp};

    fn record() -> DiagnosisRecord {
        DiagnosisRecord {
            session_id: "diag_20250101_120000".into(),
            timestamp: "20250101_120000".into(),
            report_text: "Patient: José, Age: 40, Gender: Male. Symptoms: headache 🤕".into(),
            outputs: AgentOutputs {
                general_physician: "Neuro review advised.".into(),
                cardiologist: "No cardiac signs.".into(),
                pulmonologist: "Lungs clear.".into(),
                psychologist: "Screen for stress.".into(),
                neurologist: "Consider CT if red flags.".into(),
                final_diagnosis: "Tension-type headache \u{2014} likely.".into(),
            },
            conversation_history: Vec::new(),
            followups: vec![FollowUp {
                agent: AgentKind::Neurologist,
                question: "When to image?".into(),
                answer: "Thunderclap onset or deficits.".into(),
                timestamp: "20250101_120500".into(),
            }],
        }
    }

    #[test]
    fn latin1_keeps_accents_and_drops_emoji() {
        assert_eq!(to_latin1("José 🤕"), "José ");
        assert_eq!(to_latin1("\u{201C}ok\u{201D} \u{2014} fine\u{2026}"), "\"ok\" - fine...");
        assert_eq!(to_latin1("a\u{7}b"), "ab");
    }

    #[test]
    fn wrap_respects_width() {
        let text = "one two three four five six seven eight nine ten";
        let lines = wrap(text, 10);
        assert!(lines.iter().all(|l| l.chars().count() <= 10), "{lines:?}");
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn wrap_hard_splits_long_words_and_keeps_blank_lines() {
        let lines = wrap("abcdefghijkl\n\nxy", 5);
        assert_eq!(lines, ["abcde", "fghij", "kl", "", "xy"]);
    }

    #[test]
    fn layout_orders_sections() {
        let lines = layout(&record());
        let headings: Vec<_> = lines.iter().filter(|l| l.bold).map(|l| l.text.as_str()).collect();
        assert_eq!(
            headings,
            [
                "Patient Report:",
                "=== General Physician ===",
                "=== Cardiologist ===",
                "=== Pulmonologist ===",
                "=== Psychologist ===",
                "=== Neurologist ===",
                "=== Final Diagnosis ===",
                "=== Follow-up (Neurologist) ===",
            ]
        );
        assert!(lines.iter().any(|l| l.text.contains("Tension-type headache - likely.")));
        assert!(lines.iter().all(|l| l.text.chars().all(|c| (c as u32) <= 0xFF)));
    }

    #[test]
    fn paginate_spills_to_new_pages() {
        let lines: Vec<Line> = (0..200).map(|i| Line::body(format!("line {i}"))).collect();
        let per_line = lines[0].height_mm();
        let pages = paginate(lines, 50.5 * per_line, 60.5 * per_line);
        assert_eq!(pages[0].len(), 50);
        assert_eq!(pages[1].len(), 60);
        assert_eq!(pages.iter().map(Vec::len).sum::<usize>(), 200);
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn render_produces_pdf_bytes() {
        let bytes = render(&record()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 500);
    }
}

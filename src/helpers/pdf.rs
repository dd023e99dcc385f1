use lopdf::{
    Document, Object, Stream,
    content::{Content, Operation},
    dictionary,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::errors::{TimesheetError, TimesheetResult};
use crate::models::report::{ReportView, WeekSection};

const PAGE_WIDTH: f32 = 842.0;
const PAGE_HEIGHT: f32 = 595.0;
const MARGIN: f32 = 28.0;
const NAME_COLUMN: f32 = 110.0;
const TOTAL_COLUMN: f32 = 70.0;
const ROW_HEIGHT: f32 = 22.0;

const TEXT: (f32, f32, f32) = (0.85, 0.87, 0.9);
const ACCENT: (f32, f32, f32) = (16.0 / 255.0, 185.0 / 255.0, 129.0 / 255.0);
const MUTED: (f32, f32, f32) = (0.45, 0.5, 0.56);

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    pub background_color: String,
    pub scale: f32,
    /// Whether remote images may be pulled into the capture. The bundled PDF
    /// renderer draws text only and never fetches anything.
    pub allow_cross_origin: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        CaptureOptions {
            background_color: "#050505".to_string(),
            scale: 1.0,
            allow_cross_origin: true,
        }
    }
}

/// Turns a report view into a downloadable file.
pub trait ReportRenderer: Send + Sync + 'static {
    fn render(&self, view: &ReportView, options: &CaptureOptions) -> TimesheetResult<Vec<u8>>;

    fn file_extension(&self) -> &'static str;
}

/// One landscape page per week plus a page of pay cards.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfRenderer;

impl ReportRenderer for PdfRenderer {
    fn render(&self, view: &ReportView, options: &CaptureOptions) -> TimesheetResult<Vec<u8>> {
        let scale = if options.scale.is_finite() && options.scale > 0.0 {
            options.scale
        } else {
            1.0
        };
        let background = parse_hex_color(&options.background_color).unwrap_or((0.02, 0.02, 0.02));

        let mut pages: Vec<Vec<Operation>> = view
            .weeks
            .iter()
            .map(|week| week_page(view, week, background, scale))
            .collect();
        pages.push(pay_page(view, background, scale));

        info!("Rendering report with {} page(s)", pages.len());

        let bytes = assemble(pages, scale).map_err(|e| {
            error!("Failed to build report PDF: {}", e);
            TimesheetError::Render(e.to_string())
        })?;

        info!("Rendered report PDF, size: {} bytes", bytes.len());
        Ok(bytes)
    }

    fn file_extension(&self) -> &'static str {
        "pdf"
    }
}

fn assemble(pages: Vec<Vec<Operation>>, scale: f32) -> Result<Vec<u8>, lopdf::Error> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
        },
    });

    let mut kids = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(PAGE_WIDTH * scale),
                Object::Real(PAGE_HEIGHT * scale),
            ],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut output = Vec::new();
    doc.save_to(&mut output)?;
    Ok(output)
}

/// Accumulates drawing operations in top-left page coordinates.
struct Canvas {
    ops: Vec<Operation>,
    scale: f32,
}

impl Canvas {
    fn new(background: (f32, f32, f32), scale: f32) -> Self {
        let mut canvas = Canvas {
            ops: Vec::new(),
            scale,
        };
        canvas.fill_color(background);
        canvas.ops.push(Operation::new(
            "re",
            vec![
                Object::Real(0.0),
                Object::Real(0.0),
                Object::Real(PAGE_WIDTH * scale),
                Object::Real(PAGE_HEIGHT * scale),
            ],
        ));
        canvas.ops.push(Operation::new("f", vec![]));
        canvas
    }

    fn fill_color(&mut self, (r, g, b): (f32, f32, f32)) {
        self.ops.push(Operation::new(
            "rg",
            vec![Object::Real(r), Object::Real(g), Object::Real(b)],
        ));
    }

    fn text(&mut self, x: f32, y: f32, size: f32, bold: bool, color: (f32, f32, f32), text: &str) {
        self.fill_color(color);
        self.ops.push(Operation::new("BT", vec![]));
        self.ops.push(Operation::new(
            "Tf",
            vec![
                Object::from(if bold { "F2" } else { "F1" }),
                Object::Real(size * self.scale),
            ],
        ));
        self.ops.push(Operation::new(
            "Td",
            vec![
                Object::Real(x * self.scale),
                Object::Real((PAGE_HEIGHT - y) * self.scale),
            ],
        ));
        self.ops.push(Operation::new(
            "Tj",
            vec![Object::string_literal(pdf_text(text))],
        ));
        self.ops.push(Operation::new("ET", vec![]));
    }

    fn rule(&mut self, y: f32, color: (f32, f32, f32)) {
        self.ops.push(Operation::new(
            "RG",
            vec![Object::Real(color.0), Object::Real(color.1), Object::Real(color.2)],
        ));
        self.ops.push(Operation::new("w", vec![Object::Real(0.5 * self.scale)]));
        self.ops.push(Operation::new(
            "m",
            vec![
                Object::Real(MARGIN * self.scale),
                Object::Real((PAGE_HEIGHT - y) * self.scale),
            ],
        ));
        self.ops.push(Operation::new(
            "l",
            vec![
                Object::Real((PAGE_WIDTH - MARGIN) * self.scale),
                Object::Real((PAGE_HEIGHT - y) * self.scale),
            ],
        ));
        self.ops.push(Operation::new("S", vec![]));
    }
}

fn header(canvas: &mut Canvas, view: &ReportView, subtitle: &str) {
    canvas.text(MARGIN, MARGIN + 18.0, 20.0, true, TEXT, &view.title);
    canvas.text(MARGIN, MARGIN + 36.0, 11.0, true, ACCENT, subtitle);
}

fn week_page(
    view: &ReportView,
    week: &WeekSection,
    background: (f32, f32, f32),
    scale: f32,
) -> Vec<Operation> {
    let mut canvas = Canvas::new(background, scale);
    header(&mut canvas, view, &week.label);

    let columns = week.days.len().max(1) as f32;
    let day_width = (PAGE_WIDTH - 2.0 * MARGIN - NAME_COLUMN - TOTAL_COLUMN) / columns;
    let total_x = PAGE_WIDTH - MARGIN - TOTAL_COLUMN;
    let mut y = MARGIN + 70.0;

    for (i, day) in week.days.iter().enumerate() {
        let x = MARGIN + NAME_COLUMN + i as f32 * day_width;
        canvas.text(x, y, 7.0, false, ACCENT, &day.day_name.to_uppercase());
        canvas.text(x, y + 11.0, 10.0, true, TEXT, &day.display);
        if let Some(location) = &day.location {
            canvas.text(x, y + 22.0, 6.5, false, MUTED, &truncate(&location.short_name, 18));
        }
    }
    canvas.text(total_x, y + 11.0, 10.0, true, ACCENT, "TOTAL");

    y += 32.0;
    canvas.rule(y, MUTED);

    for row in &week.rows {
        y += ROW_HEIGHT;
        canvas.text(MARGIN, y, 10.0, true, TEXT, &row.member);
        for (i, cell) in row.cells.iter().enumerate() {
            let x = MARGIN + NAME_COLUMN + i as f32 * day_width;
            let shown = match cell.marker {
                Some(marker) => marker.label().to_string(),
                None => cell.value.clone(),
            };
            canvas.text(x, y, 9.0, false, TEXT, &truncate(&shown, 10));
        }
        canvas.text(total_x, y, 10.0, true, ACCENT, &row.week_total);
    }

    canvas.ops
}

fn pay_page(view: &ReportView, background: (f32, f32, f32), scale: f32) -> Vec<Operation> {
    let mut canvas = Canvas::new(background, scale);
    header(&mut canvas, view, "RESUMEN DE PAGO");

    let columns = [
        ("MIEMBRO", MARGIN),
        ("HORAS", MARGIN + 140.0),
        ("BRUTO/HR", MARGIN + 230.0),
        ("NETO/HR", MARGIN + 320.0),
        ("TOTAL NETO", MARGIN + 420.0),
        ("DEDUCCIONES", MARGIN + 540.0),
    ];

    let mut y = MARGIN + 75.0;
    for (title, x) in columns {
        canvas.text(x, y, 8.0, true, ACCENT, title);
    }
    y += 8.0;
    canvas.rule(y, MUTED);

    for card in &view.pay_cards {
        y += ROW_HEIGHT;
        let values = [
            card.member.clone(),
            format!("{} hrs", card.total_hours),
            format!("${}", card.gross_rate),
            format!("${}", card.rate_neto),
            format!("${}", card.total_neto),
            format!("-${}", card.total_deductions),
        ];
        for ((_, x), value) in columns.iter().zip(values.iter()) {
            canvas.text(*x, y, 10.0, false, TEXT, value);
        }
    }

    canvas.ops
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}.", cut)
    }
}

/// The standard fonts only cover Latin-1, so accents are folded and anything
/// else becomes `?`.
fn pdf_text(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\u{fe0f}' | '\u{200d}'))
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'Á' | 'À' | 'Ä' | 'Â' => 'A',
            'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
            'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
            'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            'ñ' => 'n',
            'Ñ' => 'N',
            c if c.is_ascii() => c,
            _ => '?',
        })
        .collect()
}

fn parse_hex_color(color: &str) -> Option<(f32, f32, f32)> {
    let hex = color.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .ok()
            .map(|v| f32::from(v) / 255.0)
    };
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

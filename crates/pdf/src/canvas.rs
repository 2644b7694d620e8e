use lopdf::content::Operation;
use lopdf::{Object, StringFormat};
use markup_core::{Color, Paint, Point, Rect, TextPaint};

/// Bézier control-point factor for a quarter ellipse
const KAPPA: f32 = 0.552_284_8;

/// Line spacing as a multiple of the font size
const LEADING: f32 = 1.2;

/// Overlay drawing for one output page
///
/// Collects content-stream operations plus the graphics states and fonts
/// they reference; resource names are allocated here and registered on the
/// page when the sink finishes.
#[derive(Debug, Default)]
pub(crate) struct PageCanvas {
    pub(crate) operations: Vec<Operation>,
    /// (resource name, opacity)
    pub(crate) graphics_states: Vec<(String, f32)>,
    /// (resource name, standard-14 base font)
    pub(crate) fonts: Vec<(String, &'static str)>,
}

impl PageCanvas {
    pub(crate) fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn push(&mut self, operator: &str, operands: Vec<Object>) {
        self.operations.push(Operation::new(operator, operands));
    }

    fn graphics_state(&mut self, opacity: f32) -> String {
        if let Some((name, _)) = self.graphics_states.iter().find(|(_, value)| *value == opacity) {
            return name.clone();
        }
        let name = format!("MkGS{}", self.graphics_states.len() + 1);
        self.graphics_states.push((name.clone(), opacity));
        name
    }

    fn font(&mut self, family: &str) -> String {
        let base_font = standard_font(family);
        if let Some((name, _)) = self.fonts.iter().find(|(_, font)| *font == base_font) {
            return name.clone();
        }
        let name = format!("MkF{}", self.fonts.len() + 1);
        self.fonts.push((name.clone(), base_font));
        name
    }

    fn begin(&mut self, opacity: f32) {
        self.push("q", vec![]);
        if opacity < 1.0 {
            let name = self.graphics_state(opacity.clamp(0.0, 1.0));
            self.push("gs", vec![Object::Name(name.into_bytes())]);
        }
    }

    fn apply_paint(&mut self, paint: &Paint) {
        self.begin(paint.opacity);
        if let Some(color) = paint.stroke {
            self.push("RG", rgb(color));
            self.push("w", vec![paint.stroke_width.into()]);
        }
        if let Some(color) = paint.fill {
            self.push("rg", rgb(color));
        }
    }

    fn finish_path(&mut self, paint: &Paint) {
        let operator = match (paint.fill.is_some(), paint.stroke.is_some()) {
            (true, true) => "B",
            (true, false) => "f",
            (false, true) => "S",
            (false, false) => "n",
        };
        self.push(operator, vec![]);
        self.push("Q", vec![]);
    }

    pub(crate) fn rect(&mut self, rect: &Rect, paint: &Paint) {
        self.apply_paint(paint);
        self.push("re", vec![rect.x.into(), rect.y.into(), rect.width.into(), rect.height.into()]);
        self.finish_path(paint);
    }

    pub(crate) fn ellipse(&mut self, rect: &Rect, paint: &Paint) {
        let rx = rect.width / 2.0;
        let ry = rect.height / 2.0;
        let center = rect.center();
        let (cx, cy) = (center.x, center.y);
        let (kx, ky) = (rx * KAPPA, ry * KAPPA);

        self.apply_paint(paint);
        self.push("m", vec![(cx + rx).into(), cy.into()]);
        self.curve([cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry]);
        self.curve([cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy]);
        self.curve([cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry]);
        self.curve([cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy]);
        self.push("h", vec![]);
        self.finish_path(paint);
    }

    fn curve(&mut self, values: [f32; 6]) {
        self.push("c", values.into_iter().map(Object::from).collect());
    }

    pub(crate) fn line(&mut self, start: Point, end: Point, paint: &Paint) {
        self.path(&[start, end], paint);
    }

    pub(crate) fn path(&mut self, points: &[Point], paint: &Paint) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        let paint = Paint { fill: None, ..*paint };
        self.apply_paint(&paint);
        self.push("J", vec![1.into()]);
        self.push("j", vec![1.into()]);
        self.push("m", vec![first.x.into(), first.y.into()]);
        for point in rest {
            self.push("l", vec![point.x.into(), point.y.into()]);
        }
        self.finish_path(&paint);
    }

    /// Left-aligned lines from the top of `rect`, clipped to it
    pub(crate) fn text(&mut self, rect: &Rect, text: &str, paint: &TextPaint) {
        if text.is_empty() {
            return;
        }
        let font = self.font(&paint.font_family);
        let leading = paint.font_size * LEADING;

        self.begin(paint.opacity);
        self.push("re", vec![rect.x.into(), rect.y.into(), rect.width.into(), rect.height.into()]);
        self.push("W", vec![]);
        self.push("n", vec![]);
        self.push("BT", vec![]);
        self.push("Tf", vec![Object::Name(font.into_bytes()), paint.font_size.into()]);
        self.push("TL", vec![leading.into()]);
        self.push("rg", rgb(paint.color));
        self.push("Td", vec![rect.x.into(), (rect.y + rect.height - paint.font_size).into()]);
        for (index, line) in text.lines().enumerate() {
            if index > 0 {
                self.push("T*", vec![]);
            }
            self.push("Tj", vec![Object::String(win_ansi(line), StringFormat::Literal)]);
        }
        self.push("ET", vec![]);
        self.push("Q", vec![]);
    }
}

fn rgb(color: Color) -> Vec<Object> {
    let (r, g, b, _) = color.to_normalized();
    vec![r.into(), g.into(), b.into()]
}

/// Map a font family to one of the standard-14 base fonts
pub(crate) fn standard_font(family: &str) -> &'static str {
    let family = family.to_ascii_lowercase();
    if family.contains("courier") || family.contains("mono") {
        "Courier"
    } else if family.contains("times") || (family.contains("serif") && !family.contains("sans")) {
        "Times-Roman"
    } else {
        "Helvetica"
    }
}

/// Encode text for a WinAnsi standard font; unmappable characters become `?`
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            code @ (0x20..=0x7e | 0xa0..=0xff) => code as u8,
            _ => b'?',
        })
        .collect()
}

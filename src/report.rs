//! Attendance report emitted when a session is finalized.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point,
};

use crate::errors::AppError;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 15.0;
const ROW_HEIGHT: f32 = 6.0;

/// A learner of the class, whether or not they attended.
#[derive(Debug, Clone)]
pub struct ReportLearner {
    pub learner_binding_id: i32,
    pub document: String,
    pub name: String,
}

/// A record of the session joined with its learner.
#[derive(Debug, Clone)]
pub struct ReportRecord {
    pub learner: ReportLearner,
    pub ingress_time: Option<DateTime<Utc>>,
    pub egress_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendedRow {
    pub document: String,
    pub name: String,
    pub ingress: String,
    pub egress: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbsentRow {
    pub document: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct AttendanceReport {
    pub class_code: String,
    pub date: NaiveDate,
    pub session_id: i32,
    pub start_time: String,
    pub end_time: String,
    pub attended: Vec<AttendedRow>,
    pub absent: Vec<AbsentRow>,
}

impl AttendanceReport {
    /// Splits the class roster into attended (any ingress) and absent learners.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        class_code: &str,
        date: NaiveDate,
        session_id: i32,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        records: &[ReportRecord],
        roster: &[ReportLearner],
        offset: FixedOffset,
    ) -> Self {
        let fmt = |t: Option<DateTime<Utc>>| {
            t.map(|t| t.with_timezone(&offset).format("%H:%M").to_string())
                .unwrap_or_else(|| "-".to_string())
        };

        let mut attended: Vec<AttendedRow> = records
            .iter()
            .filter(|r| r.ingress_time.is_some())
            .map(|r| AttendedRow {
                document: r.learner.document.clone(),
                name: r.learner.name.clone(),
                ingress: fmt(r.ingress_time),
                egress: fmt(r.egress_time),
            })
            .collect();
        attended.sort_by(|a, b| a.name.cmp(&b.name));

        let present: HashSet<i32> = records
            .iter()
            .filter(|r| r.ingress_time.is_some())
            .map(|r| r.learner.learner_binding_id)
            .collect();
        let mut absent: Vec<AbsentRow> = roster
            .iter()
            .filter(|l| !present.contains(&l.learner_binding_id))
            .map(|l| AbsentRow {
                document: l.document.clone(),
                name: l.name.clone(),
            })
            .collect();
        absent.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            class_code: class_code.to_string(),
            date,
            session_id,
            start_time: fmt(Some(start_time)),
            end_time: fmt(end_time),
            attended,
            absent,
        }
    }

    /// `attendance_<class_code>_<YYYY-MM-DD>_<session_id>.pdf`
    pub fn file_name(&self) -> String {
        let code: String = self
            .class_code
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!(
            "attendance_{}_{}_{}.pdf",
            code,
            self.date.format("%Y-%m-%d"),
            self.session_id
        )
    }
}

/// Writes a report somewhere and returns where.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, report: &AttendanceReport) -> Result<PathBuf, AppError>;
}

/// A4 portrait PDF using the built-in Helvetica faces.
#[derive(Debug, Clone)]
pub struct PdfReportRenderer {
    dir: PathBuf,
}

impl PdfReportRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ReportRenderer for PdfReportRenderer {
    fn render(&self, report: &AttendanceReport) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(report.file_name());

        let (doc, page, layer) = PdfDocument::new(
            format!("Attendance {}", ascii_fold(&report.class_code)),
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            "Layer 1".to_string(),
        );
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;
        let mut cursor = Cursor {
            doc: &doc,
            layer: doc.get_page(page).get_layer(layer),
            y: PAGE_HEIGHT - MARGIN,
        };

        cursor.text("ATTENDANCE REPORT", 16.0, MARGIN, &bold);
        cursor.advance(ROW_HEIGHT * 1.5);
        cursor.text(
            &format!("Class: {}", report.class_code),
            11.0,
            MARGIN,
            &regular,
        );
        cursor.advance(ROW_HEIGHT);
        cursor.text(
            &format!(
                "Date: {}    Session: {}",
                report.date.format("%Y-%m-%d"),
                report.session_id
            ),
            11.0,
            MARGIN,
            &regular,
        );
        cursor.advance(ROW_HEIGHT);
        cursor.text(
            &format!("Start: {}    End: {}", report.start_time, report.end_time),
            11.0,
            MARGIN,
            &regular,
        );
        cursor.advance(ROW_HEIGHT * 2.0);

        let attended_cols = [MARGIN, 50.0, 140.0, 170.0];
        cursor.text(
            &format!("ATTENDED ({})", report.attended.len()),
            13.0,
            MARGIN,
            &bold,
        );
        cursor.advance(ROW_HEIGHT);
        cursor.row(&attended_cols, &["Document", "Name", "Ingress", "Egress"], &bold);
        cursor.rule();
        for row in &report.attended {
            cursor.row(
                &attended_cols,
                &[
                    row.document.as_str(),
                    row.name.as_str(),
                    row.ingress.as_str(),
                    row.egress.as_str(),
                ],
                &regular,
            );
        }
        cursor.advance(ROW_HEIGHT);

        let absent_cols = [MARGIN, 50.0];
        cursor.text(
            &format!("DID NOT ATTEND ({})", report.absent.len()),
            13.0,
            MARGIN,
            &bold,
        );
        cursor.advance(ROW_HEIGHT);
        cursor.row(&absent_cols, &["Document", "Name"], &bold);
        cursor.rule();
        for row in &report.absent {
            cursor.row(&absent_cols, &[row.document.as_str(), row.name.as_str()], &regular);
        }

        let mut writer = BufWriter::new(File::create(&path)?);
        doc.save(&mut writer)?;
        Ok(path)
    }
}

struct Cursor<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl Cursor<'_> {
    fn text(&self, text: &str, size: f32, x: f32, font: &IndirectFontRef) {
        self.layer
            .use_text(ascii_fold(text), size, Mm(x), Mm(self.y), font);
    }

    fn advance(&mut self, by: f32) {
        self.y -= by;
        if self.y < MARGIN {
            let (page, layer) = self
                .doc
                .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn row(&mut self, columns: &[f32], cells: &[&str], font: &IndirectFontRef) {
        for (x, cell) in columns.iter().zip(cells) {
            self.text(cell, 9.0, *x, font);
        }
        self.advance(ROW_HEIGHT);
    }

    fn rule(&mut self) {
        let y = self.y + ROW_HEIGHT - 1.5;
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN), Mm(y)), false),
                (Point::new(Mm(PAGE_WIDTH - MARGIN), Mm(y)), false),
            ],
            is_closed: false,
        });
    }
}

/// Strips diacritics; anything else outside ASCII becomes `?`.
pub fn ascii_fold(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
            'Á' | 'À' | 'Ä' | 'Â' | 'Ã' => 'A',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
            'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
            'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' => 'O',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            'ñ' => 'n',
            'Ñ' => 'N',
            'ç' => 'c',
            'Ç' => 'C',
            c if c.is_ascii() => c,
            _ => '?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn learner(id: i32, name: &str) -> ReportLearner {
        ReportLearner {
            learner_binding_id: id,
            document: format!("CC-{id}"),
            name: name.to_string(),
        }
    }

    fn sample() -> AttendanceReport {
        let t = |h, m| Utc.with_ymd_and_hms(2024, 5, 10, h, m, 0).unwrap();
        let roster: Vec<ReportLearner> = (1..=5).map(|i| learner(i, &format!("Learner {i}"))).collect();
        let records = vec![
            ReportRecord {
                learner: roster[0].clone(),
                ingress_time: Some(t(13, 5)),
                egress_time: Some(t(17, 0)),
            },
            ReportRecord {
                learner: roster[1].clone(),
                ingress_time: Some(t(13, 6)),
                egress_time: Some(t(17, 1)),
            },
            ReportRecord {
                learner: roster[2].clone(),
                ingress_time: Some(t(13, 7)),
                egress_time: None,
            },
        ];
        AttendanceReport::build(
            "FC-7001",
            NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            12,
            t(13, 0),
            Some(t(18, 0)),
            &records,
            &roster,
            FixedOffset::east_opt(0).unwrap(),
        )
    }

    #[test]
    fn test_build_splits_attended_and_absent() {
        let report = sample();
        assert_eq!(report.attended.len(), 3);
        assert_eq!(report.absent.len(), 2);
        assert_eq!(report.attended[2].egress, "-");
        assert_eq!(report.start_time, "13:00");
        assert_eq!(report.end_time, "18:00");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(sample().file_name(), "attendance_FC-7001_2024-05-10_12.pdf");
    }

    #[test]
    fn test_ascii_fold() {
        assert_eq!(ascii_fold("José Peña Álvarez"), "Jose Pena Alvarez");
        assert_eq!(ascii_fold("naïve ü"), "naive u");
        assert_eq!(ascii_fold("日本"), "??");
    }

    #[test]
    fn test_pdf_written_to_directory() {
        let dir = TempDir::new().unwrap();
        let renderer = PdfReportRenderer::new(dir.path().join("nested"));
        let path = renderer.render(&sample()).unwrap();

        assert!(path.ends_with("attendance_FC-7001_2024-05-10_12.pdf"));
        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}

use crate::analysis::{DistanceReport, ErrorPercentages};
use crate::canvas::CharCanvas;
use crate::error::AcquisitionError;
use crate::types::Sample;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use std::io::{self, Write};

/// Where user-facing output goes.
pub trait DisplaySink {
    fn show_acceleration(&mut self, value: f64);
    fn show_state(&mut self, label: &str);
    fn show_distance(&mut self, report: &DistanceReport, errors: Option<&ErrorPercentages>);
    fn show_error(&mut self, error: &AcquisitionError);
    fn clear_error(&mut self);

    fn show_raw(&mut self, _sample: &Sample, _total: u64, _rate: usize) {}

    fn show_frame(&mut self, _canvas: &CharCanvas) {}
}

/// Terminal output: one live status line plus result blocks.
///
/// While an error is set it replaces the live readings, and it is redrawn
/// under every graph frame until `clear_error`.
pub struct ConsoleDisplay<W: Write> {
    out: W,
    precision: usize,
    state: String,
    acceleration: String,
    raw: Option<String>,
    error: Option<String>,
}

impl<W: Write> ConsoleDisplay<W> {
    pub fn new(out: W, precision: usize) -> Self {
        Self {
            out,
            precision,
            state: String::new(),
            acceleration: "-".to_string(),
            raw: None,
            error: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn written(&self) -> &W {
        &self.out
    }

    fn live_line(&self) -> String {
        if let Some(error) = &self.error {
            return format!("{:<16} {}", self.state, error);
        }
        match &self.raw {
            Some(raw) => format!("{:<16} {}", self.state, raw),
            None => format!("{:<16} a = {}", self.state, self.acceleration),
        }
    }

    fn redraw(&mut self) {
        let line = self.live_line();
        let result = queue!(self.out, Print("\r"), Clear(ClearType::CurrentLine), Print(line))
            .and_then(|_| self.out.flush());
        self.check(result);
    }

    fn block(&mut self, text: &str) {
        let result = writeln!(self.out, "\n{}", text).and_then(|_| self.out.flush());
        self.check(result);
    }

    fn check(&self, result: io::Result<()>) {
        if let Err(e) = result {
            log::debug!("[SESSION] Display write failed: {}", e);
        }
    }
}

pub fn format_report(report: &DistanceReport, errors: Option<&ErrorPercentages>) -> String {
    let e = &report.estimate;
    let mut text = format!(
        "Enregistrement\n  {} données en {} ms\nDistances estimées\n  Avec le temps : {:.3} m\n  Avec l'accélération : {:.3} m\n  Moyenne des deux : {:.3} m",
        report.sample_count, report.duration_ms, e.time_based_height, e.acceleration_based_height, e.average_height
    );
    if let Some(err) = errors {
        text.push_str(&format!(
            "\nÉcarts\n  Temps : {:.2} %\n  Accélération : {:.2} %\n  Moyenne : {:.2} %",
            err.time_based, err.acceleration_based, err.average
        ));
    }
    text
}

impl<W: Write> DisplaySink for ConsoleDisplay<W> {
    fn show_acceleration(&mut self, value: f64) {
        self.acceleration = format!("{:.*}", self.precision, value);
        self.redraw();
    }

    fn show_state(&mut self, label: &str) {
        if self.state != label {
            self.state = label.to_string();
            self.redraw();
        }
    }

    fn show_distance(&mut self, report: &DistanceReport, errors: Option<&ErrorPercentages>) {
        self.block(&format_report(report, errors));
    }

    fn show_error(&mut self, error: &AcquisitionError) {
        let hint = if error.is_recoverable() {
            " (tapez `retry` pour relancer)"
        } else {
            ""
        };
        let message = format!("Erreur : {}", error);
        self.block(&format!("{}{}", message, hint));
        self.error = Some(message);
        self.redraw();
    }

    fn clear_error(&mut self) {
        self.error = None;
        self.redraw();
    }

    fn show_raw(&mut self, sample: &Sample, total: u64, rate: usize) {
        self.raw = Some(format!(
            "x = {:.*}  y = {:.*}  z = {:.*}  | {} données, {}/s",
            self.precision, sample.x, self.precision, sample.y, self.precision, sample.z, total, rate
        ));
        self.redraw();
    }

    fn show_frame(&mut self, canvas: &CharCanvas) {
        let result = canvas.present(&mut self.out);
        self.check(result);
        self.redraw();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::DistanceEstimate;

    fn output(display: ConsoleDisplay<Vec<u8>>) -> String {
        String::from_utf8(display.written().clone()).unwrap()
    }

    #[test]
    fn test_acceleration_precision() {
        let mut display = ConsoleDisplay::new(Vec::new(), 2);
        display.show_state("⬆");
        display.show_acceleration(1.23456);
        let text = output(display);
        assert!(text.contains("a = 1.23"));
        assert!(!text.contains("1.234"));
    }

    #[test]
    fn test_report_block() {
        let report = DistanceReport {
            estimate: DistanceEstimate::new(0.5, 0.25),
            sample_count: 12,
            duration_ms: 640,
        };
        let errors = ErrorPercentages {
            time_based: 50.0,
            acceleration_based: 75.0,
            average: 62.5,
        };
        let text = format_report(&report, Some(&errors));
        assert!(text.contains("12 données en 640 ms"));
        assert!(text.contains("Moyenne des deux : 0.375 m"));
        assert!(text.contains("Accélération : 75.00 %"));
        assert!(!format_report(&report, None).contains('%'));
    }

    #[test]
    fn test_error_hint_only_when_recoverable() {
        let mut display = ConsoleDisplay::new(Vec::new(), 1);
        display.show_error(&AcquisitionError::NoSensorSupport);
        display.show_error(&AcquisitionError::NoDataTimeout { waited_ms: 1000 });
        let text = output(display);
        assert_eq!(text.matches("retry").count(), 1);
    }

    fn after_last_frame(text: &str) -> &str {
        text.rsplit("\x1b[2J").next().unwrap_or(text)
    }

    #[test]
    fn test_error_survives_frames_until_cleared() {
        let canvas = CharCanvas::new(10, 3);
        let mut display = ConsoleDisplay::new(Vec::new(), 1);
        display.show_acceleration(0.5);
        display.show_error(&AcquisitionError::NoDataTimeout { waited_ms: 1000 });
        display.show_acceleration(0.7);
        display.show_frame(&canvas);
        display.show_frame(&canvas);
        let text = String::from_utf8(display.written().clone()).unwrap();
        let tail = after_last_frame(&text);
        assert!(tail.contains("Erreur"));
        assert!(!tail.contains("a = 0.7"));

        display.clear_error();
        display.show_frame(&canvas);
        let text = output(display);
        let tail = after_last_frame(&text);
        assert!(!tail.contains("Erreur"));
        assert!(tail.contains("a = 0.7"));
    }
}

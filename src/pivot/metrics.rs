use super::{AttendanceSummary, GradeSummary, PivotKind, StudentPivotRow, Summary};
use serde::{Deserialize, Serialize};

pub const NO_DATA: &str = "-";

pub const DEFAULT_BAND_A: f64 = 90.0;
pub const DEFAULT_BAND_B: f64 = 80.0;
pub const DEFAULT_BAND_C: f64 = 70.0;
pub const DEFAULT_BAND_D: f64 = 60.0;

/// `round(present / total * 100)`. Zero lessons is 0% by convention, which is
/// not the same as a missing grade average.
pub fn attendance_percentage(present: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (f64::from(present) / f64::from(total) * 100.0).round() as u32
}

pub fn format_percentage(summary: &AttendanceSummary) -> String {
    format!("{}%", summary.percentage())
}

pub fn format_average(summary: &GradeSummary) -> String {
    if summary.has_data() {
        format!("{:.2}", summary.average)
    } else {
        NO_DATA.to_string()
    }
}

/// Lower bounds (inclusive) of letters A to D; anything below `d` is E.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBands {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Default for GradeBands {
    fn default() -> Self {
        Self {
            a: DEFAULT_BAND_A,
            b: DEFAULT_BAND_B,
            c: DEFAULT_BAND_C,
            d: DEFAULT_BAND_D,
        }
    }
}

impl GradeBands {
    pub fn validate(&self) -> Result<(), String> {
        let bounds = [self.a, self.b, self.c, self.d];
        if bounds.iter().any(|b| !(0.0..=100.0).contains(b)) {
            return Err("grade bands must be within 0..=100".into());
        }
        if bounds.windows(2).any(|w| w[0] <= w[1]) {
            return Err("grade bands must be strictly descending (a > b > c > d)".into());
        }
        Ok(())
    }

    pub fn letter(&self, score: f64) -> char {
        if score >= self.a {
            'A'
        } else if score >= self.b {
            'B'
        } else if score >= self.c {
            'C'
        } else if score >= self.d {
            'D'
        } else {
            'E'
        }
    }

    /// Letter for a student's summary; no letter without any scored task.
    pub fn letter_for(&self, summary: &GradeSummary) -> Option<char> {
        summary.has_data().then(|| self.letter(summary.average))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClassSummary {
    #[serde(rename_all = "camelCase")]
    Attendance {
        student_count: usize,
        totals: AttendanceSummary,
        percentage: u32,
    },
    #[serde(rename_all = "camelCase")]
    Grades {
        student_count: usize,
        graded_count: usize,
        /// Mean of student averages; `None` when nobody has a score.
        average: Option<f64>,
    },
}

/// Class-wide figures over rows that already passed the owner filter.
pub fn class_summary(kind: PivotKind, rows: &[StudentPivotRow]) -> ClassSummary {
    match kind {
        PivotKind::Attendance => {
            let mut totals = AttendanceSummary::default();
            for row in rows {
                if let Summary::Attendance(s) = row.summary {
                    totals.present += s.present;
                    totals.excused += s.excused;
                    totals.sick += s.sick;
                    totals.absent += s.absent;
                    totals.total += s.total;
                }
            }
            ClassSummary::Attendance {
                student_count: rows.len(),
                percentage: totals.percentage(),
                totals,
            }
        }
        PivotKind::Grades => {
            let averages: Vec<f64> = rows
                .iter()
                .filter_map(|row| match row.summary {
                    Summary::Grade(g) if g.has_data() => Some(g.average),
                    _ => None,
                })
                .collect();
            let average = if averages.is_empty() {
                None
            } else {
                let mean = averages.iter().sum::<f64>() / averages.len() as f64;
                Some((mean * 100.0).round() / 100.0)
            };
            ClassSummary::Grades {
                student_count: rows.len(),
                graded_count: averages.len(),
                average,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(attendance_percentage(2, 3), 67);
        assert_eq!(attendance_percentage(1, 8), 13);
        assert_eq!(attendance_percentage(5, 5), 100);
    }

    #[test]
    fn zero_lessons_is_zero_percent_not_no_data() {
        let summary = AttendanceSummary::default();
        assert_eq!(summary.percentage(), 0);
        assert_eq!(format_percentage(&summary), "0%");
    }

    #[test]
    fn missing_average_is_no_data_not_zero() {
        let empty = GradeSummary::default();
        assert_eq!(empty.average, 0.0);
        assert_eq!(format_average(&empty), "-");
        assert_eq!(GradeBands::default().letter_for(&empty), None);

        let scored_zero = GradeSummary {
            average: 0.0,
            count: 1,
        };
        assert_eq!(format_average(&scored_zero), "0.00");
        assert_eq!(GradeBands::default().letter_for(&scored_zero), Some('E'));
    }

    #[test]
    fn default_bands_bucket_scores() {
        let bands = GradeBands::default();
        assert_eq!(bands.letter(100.0), 'A');
        assert_eq!(bands.letter(90.0), 'A');
        assert_eq!(bands.letter(89.99), 'B');
        assert_eq!(bands.letter(80.0), 'B');
        assert_eq!(bands.letter(70.0), 'C');
        assert_eq!(bands.letter(60.0), 'D');
        assert_eq!(bands.letter(59.5), 'E');
    }

    #[test]
    fn tuned_bands_move_thresholds() {
        let bands = GradeBands {
            a: 85.0,
            b: 75.0,
            c: 65.0,
            d: 55.0,
        };
        assert!(bands.validate().is_ok());
        assert_eq!(bands.letter(86.0), 'A');
        assert_eq!(bands.letter(56.0), 'D');
    }

    #[test]
    fn bands_must_descend() {
        let bands = GradeBands {
            a: 80.0,
            b: 80.0,
            c: 70.0,
            d: 60.0,
        };
        assert!(bands.validate().is_err());
        let bands = GradeBands {
            a: 120.0,
            ..GradeBands::default()
        };
        assert!(bands.validate().is_err());
    }
}

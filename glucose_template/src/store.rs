//! Template parsing and validated storage

use crate::utils::parse_hhmm;
use crate::{
    Result, TemplateError, TemplateMeal, TemplateRow, Vitals, MINUTES_PER_DAY, TEMPLATE_ROWS,
};
use csv::StringRecord;
use log::{debug, info};
use std::fs::File;
use std::io::Read;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;

/// Column names of the template resource
pub(crate) mod columns {
    pub const DAY: &str = "day";
    pub const TIME: &str = "time";
    pub const MINUTE_INDEX: &str = "minute_index";
    pub const MINUTE_OF_DAY: &str = "minute_of_day";
    pub const GLUCOSE: &str = "glucose";
    pub const HR: &str = "HR";
    pub const METS: &str = "METs";
    pub const CALORIES_ACTIVITY: &str = "Calories (Activity)";
    pub const MEAL_TYPE: &str = "Meal Type";
    pub const CALORIES: &str = "Calories";
    pub const CARBS: &str = "Carbs";
    pub const PROTEIN: &str = "Protein";
    pub const FAT: &str = "Fat";
    pub const AMOUNT_CONSUMED: &str = "Amount Consumed";
    pub const IMAGE_PATH: &str = "Image path";

    pub const REQUIRED: [&str; 5] = [DAY, TIME, MINUTE_INDEX, MINUTE_OF_DAY, GLUCOSE];

    pub const ALL: [&str; 15] = [
        DAY,
        TIME,
        MINUTE_INDEX,
        MINUTE_OF_DAY,
        GLUCOSE,
        HR,
        METS,
        CALORIES_ACTIVITY,
        MEAL_TYPE,
        CALORIES,
        CARBS,
        PROTEIN,
        FAT,
        AMOUNT_CONSUMED,
        IMAGE_PATH,
    ];
}

/// Leniently resolved optional cell
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Number(f64),
    Text(String),
}

/// Empty and case-insensitive "nan" cells resolve to `None`.
fn lenient_cell(raw: &str) -> Option<Cell> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(value) => Some(Cell::Number(value)),
        Err(_) => Some(Cell::Text(trimmed.to_string())),
    }
}

/// Column positions resolved from the header row
#[derive(Debug)]
struct ColumnMap {
    day: usize,
    time: usize,
    minute_index: usize,
    minute_of_day: usize,
    glucose: usize,
    hr: Option<usize>,
    mets: Option<usize>,
    calories_activity: Option<usize>,
    meal_type: Option<usize>,
    calories: Option<usize>,
    carbs: Option<usize>,
    protein: Option<usize>,
    fat: Option<usize>,
    amount_consumed: Option<usize>,
    image_path: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        let missing: Vec<&str> = columns::REQUIRED
            .iter()
            .copied()
            .filter(|&name| find(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(TemplateError::Parse(format!(
                "Missing required column(s): {}",
                missing.join(", ")
            )));
        }

        let required = |name: &str| {
            find(name).ok_or_else(|| TemplateError::Parse(format!("Missing column {}", name)))
        };

        Ok(Self {
            day: required(columns::DAY)?,
            time: required(columns::TIME)?,
            minute_index: required(columns::MINUTE_INDEX)?,
            minute_of_day: required(columns::MINUTE_OF_DAY)?,
            glucose: required(columns::GLUCOSE)?,
            hr: find(columns::HR),
            mets: find(columns::METS),
            calories_activity: find(columns::CALORIES_ACTIVITY),
            meal_type: find(columns::MEAL_TYPE),
            calories: find(columns::CALORIES),
            carbs: find(columns::CARBS),
            protein: find(columns::PROTEIN),
            fat: find(columns::FAT),
            amount_consumed: find(columns::AMOUNT_CONSUMED),
            image_path: find(columns::IMAGE_PATH),
        })
    }
}

/// Reads one CSV record into a row, reporting `line` in errors
struct RecordReader<'a> {
    record: &'a StringRecord,
    line: usize,
}

impl RecordReader<'_> {
    fn raw(&self, idx: usize, name: &str) -> Result<&str> {
        self.record.get(idx).ok_or_else(|| {
            TemplateError::Parse(format!("Line {}: missing value for '{}'", self.line, name))
        })
    }

    fn required_number<T: std::str::FromStr>(&self, idx: usize, name: &str) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        let raw = self.raw(idx, name)?.trim();
        raw.parse::<T>().map_err(|e| {
            TemplateError::Parse(format!(
                "Line {}: invalid {} '{}': {}",
                self.line, name, raw, e
            ))
        })
    }

    fn optional_number(&self, idx: Option<usize>, name: &str) -> Result<Option<f64>> {
        let Some(idx) = idx else {
            return Ok(None);
        };
        match lenient_cell(self.raw(idx, name)?) {
            None => Ok(None),
            Some(Cell::Number(value)) => Ok(Some(value)),
            Some(Cell::Text(text)) => {
                debug!(
                    "Line {}: non-numeric '{}' in optional column '{}', treated as empty",
                    self.line, text, name
                );
                Ok(None)
            }
        }
    }

    fn optional_text(&self, idx: Option<usize>, name: &str) -> Result<Option<String>> {
        let Some(idx) = idx else {
            return Ok(None);
        };
        Ok(lenient_cell(self.raw(idx, name)?).map(|cell| match cell {
            Cell::Number(value) => value.to_string(),
            Cell::Text(text) => text,
        }))
    }

    fn row(&self, map: &ColumnMap) -> Result<TemplateRow> {
        let glucose: f64 = self.required_number(map.glucose, columns::GLUCOSE)?;
        if !glucose.is_finite() {
            return Err(TemplateError::Parse(format!(
                "Line {}: glucose must be a finite number",
                self.line
            )));
        }

        let meal = TemplateMeal {
            meal_type: self.optional_text(map.meal_type, columns::MEAL_TYPE)?,
            calories: self.optional_number(map.calories, columns::CALORIES)?,
            carbs: self.optional_number(map.carbs, columns::CARBS)?,
            protein: self.optional_number(map.protein, columns::PROTEIN)?,
            fat: self.optional_number(map.fat, columns::FAT)?,
            amount_consumed: self.optional_number(map.amount_consumed, columns::AMOUNT_CONSUMED)?,
            image_path: self.optional_text(map.image_path, columns::IMAGE_PATH)?,
        };

        Ok(TemplateRow {
            day: self.required_number(map.day, columns::DAY)?,
            time: parse_hhmm(self.raw(map.time, columns::TIME)?).map_err(|e| {
                TemplateError::Parse(format!("Line {}: {}", self.line, e))
            })?,
            minute_index: self.required_number(map.minute_index, columns::MINUTE_INDEX)?,
            minute_of_day: self.required_number(map.minute_of_day, columns::MINUTE_OF_DAY)?,
            glucose,
            vitals: Vitals {
                hr: self.optional_number(map.hr, columns::HR)?,
                mets: self.optional_number(map.mets, columns::METS)?,
                calories_activity: self
                    .optional_number(map.calories_activity, columns::CALORIES_ACTIVITY)?,
            },
            meal: if meal.is_empty() { None } else { Some(meal) },
        })
    }
}

fn csv_error(err: csv::Error) -> TemplateError {
    if err.is_io_error() {
        TemplateError::Load(err.to_string())
    } else {
        TemplateError::Parse(err.to_string())
    }
}

/// Immutable, validated two-day template
///
/// Cloning is cheap: rows are shared, so each prediction can hold its own
/// snapshot of the template.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateStore {
    rows: Arc<[TemplateRow]>,
}

impl TemplateStore {
    /// Load a template from a CSV file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            TemplateError::Load(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let store = Self::from_reader(file)?;
        info!(
            "loaded glucose template from {} ({} rows)",
            path.display(),
            store.len()
        );
        Ok(store)
    }

    /// Parse a template from CSV text
    pub fn from_csv_str(text: &str) -> Result<Self> {
        Self::from_reader(text.as_bytes())
    }

    /// Parse a template from any CSV reader
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let headers = csv_reader.headers().map_err(csv_error)?.clone();
        let map = ColumnMap::from_headers(&headers)?;
        debug!("template columns resolved: {:?}", map);

        let mut rows = Vec::with_capacity(TEMPLATE_ROWS);
        for (i, record) in csv_reader.records().enumerate() {
            let record = record.map_err(csv_error)?;
            // Header is line 1
            let reader = RecordReader {
                record: &record,
                line: i + 2,
            };
            rows.push(reader.row(&map)?);
        }

        Self::from_rows(rows)
    }

    /// Validate a set of rows, sorting them by `minute_index` first.
    ///
    /// Fails unless the rows cover every minute index `0..2880` exactly once
    /// with consistent day, time and minute-of-day fields.
    pub fn from_rows(mut rows: Vec<TemplateRow>) -> Result<Self> {
        rows.sort_by_key(|row| row.minute_index);

        if rows.len() != TEMPLATE_ROWS {
            return Err(TemplateError::Parse(format!(
                "Expected {} template rows, found {}",
                TEMPLATE_ROWS,
                rows.len()
            )));
        }

        for (expected, row) in rows.iter().enumerate() {
            validate_row(expected, row)?;
        }

        Ok(Self { rows: rows.into() })
    }

    /// All rows in ascending `minute_index` order
    pub fn rows(&self) -> &[TemplateRow] {
        &self.rows
    }

    /// Number of rows (always [`TEMPLATE_ROWS`] for a validated store)
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the store has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row at a minute index
    pub fn row(&self, minute_index: usize) -> Option<&TemplateRow> {
        self.rows.get(minute_index)
    }

    /// Rows in an inclusive minute-index range, or `None` if it runs past the end
    pub fn slice(&self, range: RangeInclusive<usize>) -> Option<&[TemplateRow]> {
        self.rows.get(range)
    }

    /// Rows of synthetic day 1 or 2
    pub fn day_rows(&self, day: u8) -> Option<&[TemplateRow]> {
        match day {
            1 => self.slice(0..=MINUTES_PER_DAY - 1),
            2 => self.slice(MINUTES_PER_DAY..=TEMPLATE_ROWS - 1),
            _ => None,
        }
    }

    /// Glucose column as a plain vector
    pub fn glucose_values(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.glucose).collect()
    }
}

fn validate_row(expected: usize, row: &TemplateRow) -> Result<()> {
    if row.minute_index != expected {
        let problem = if row.minute_index < expected {
            "duplicate"
        } else {
            "gap before"
        };
        return Err(TemplateError::Parse(format!(
            "Template is not contiguous: {} minute_index {} (expected {})",
            problem, row.minute_index, expected
        )));
    }

    if row.day != 1 && row.day != 2 {
        return Err(TemplateError::Parse(format!(
            "minute_index {}: day must be 1 or 2, got {}",
            row.minute_index, row.day
        )));
    }

    if row.minute_of_day >= MINUTES_PER_DAY {
        return Err(TemplateError::Parse(format!(
            "minute_index {}: minute_of_day {} out of range",
            row.minute_index, row.minute_of_day
        )));
    }

    let implied = (row.day as usize - 1) * MINUTES_PER_DAY + row.minute_of_day;
    if implied != row.minute_index {
        return Err(TemplateError::Parse(format!(
            "minute_index {} disagrees with day {} / minute_of_day {}",
            row.minute_index, row.day, row.minute_of_day
        )));
    }

    if row.time_minute_of_day() != row.minute_of_day {
        return Err(TemplateError::Parse(format!(
            "minute_index {}: time {} disagrees with minute_of_day {}",
            row.minute_index,
            row.time.format("%H:%M"),
            row.minute_of_day
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::template_from_fn;
    use rstest::rstest;

    fn contiguous_rows() -> Vec<TemplateRow> {
        (0..TEMPLATE_ROWS)
            .map(|i| TemplateRow::at_index(i, 100.0))
            .collect()
    }

    #[rstest]
    #[case("", None)]
    #[case("  ", None)]
    #[case("nan", None)]
    #[case("NaN", None)]
    #[case("NAN", None)]
    #[case(" 72.5 ", Some(Cell::Number(72.5)))]
    #[case(" Lunch ", Some(Cell::Text("Lunch".to_string())))]
    fn test_lenient_cell(#[case] raw: &str, #[case] expected: Option<Cell>) {
        assert_eq!(lenient_cell(raw), expected);
    }

    #[test]
    fn test_from_rows_sorts() {
        let mut rows = contiguous_rows();
        rows.reverse();
        let store = TemplateStore::from_rows(rows).unwrap();
        assert_eq!(store.row(0).unwrap().minute_index, 0);
        assert_eq!(store.row(2879).unwrap().minute_index, 2879);
    }

    #[test]
    fn test_from_rows_rejects_short_template() {
        let mut rows = contiguous_rows();
        rows.truncate(2000);
        let err = TemplateStore::from_rows(rows).unwrap_err();
        assert!(matches!(err, TemplateError::Parse(_)));
    }

    #[test]
    fn test_from_rows_rejects_duplicate() {
        let mut rows = contiguous_rows();
        rows[11] = TemplateRow::at_index(10, 100.0);
        let err = TemplateStore::from_rows(rows).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_from_rows_rejects_inconsistent_day() {
        let mut rows = contiguous_rows();
        rows[1500].day = 1;
        assert!(TemplateStore::from_rows(rows).is_err());
    }

    #[test]
    fn test_from_rows_rejects_time_mismatch() {
        let mut rows = contiguous_rows();
        rows[30].time = crate::utils::minute_to_time(31);
        assert!(TemplateStore::from_rows(rows).is_err());
    }

    #[test]
    fn test_slices() {
        let store = template_from_fn(|i| i as f64).unwrap();
        let slice = store.slice(1490..=1499).unwrap();
        assert_eq!(slice.len(), 10);
        assert_eq!(slice[9].minute_index, 1499);

        assert!(store.slice(2875..=2880).is_none());
        assert_eq!(store.day_rows(2).unwrap()[0].minute_index, 1440);
        assert_eq!(store.day_rows(1).unwrap().len(), 1440);
        assert!(store.day_rows(3).is_none());
        assert_eq!(store.glucose_values().len(), TEMPLATE_ROWS);
    }

    #[test]
    fn test_missing_required_column() {
        let csv = "day,time,minute_index,glucose\n1,00:00,0,100\n";
        let err = TemplateStore::from_csv_str(csv).unwrap_err();
        match err {
            TemplateError::Parse(msg) => assert!(msg.contains("minute_of_day")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_text_in_optional_numeric_column_is_empty() {
        let mut csv = String::from("day,time,minute_index,minute_of_day,glucose,HR,Carbs\n");
        for row in contiguous_rows() {
            let hr = if row.minute_index == 7 { "n/a" } else { "70" };
            let carbs = if row.minute_index == 900 { "lots" } else { "" };
            csv.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                row.day,
                row.time.format("%H:%M"),
                row.minute_index,
                row.minute_of_day,
                row.glucose,
                hr,
                carbs
            ));
        }

        let store = TemplateStore::from_csv_str(&csv).unwrap();
        assert_eq!(store.len(), TEMPLATE_ROWS);
        assert_eq!(store.row(7).unwrap().vitals.hr, None);
        assert_eq!(store.row(8).unwrap().vitals.hr, Some(70.0));
        assert!(store.row(900).unwrap().meal.is_none());
    }

    #[test]
    fn test_text_in_glucose_is_rejected() {
        let csv = "day,time,minute_index,minute_of_day,glucose\n1,00:00,0,0,high\n";
        let err = TemplateStore::from_csv_str(csv).unwrap_err();
        assert!(err.to_string().contains("glucose"));
    }
}

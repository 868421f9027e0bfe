//! Named series of acquired data points.

/// One or more named value columns collected during a measurement run.
///
/// A series starts with a single column; [`join`](Series::join) merges
/// series column-wise, padding the shorter side with empty cells so every
/// row stays rectangular.
#[derive(Debug, Clone, Default)]
pub struct Series {
    headers: Vec<String>,
    header_fields: Vec<(String, String)>,
    rows: Vec<Vec<Option<f64>>>,
}

impl Series {
    pub fn new(header_name: &str) -> Self {
        Self {
            headers: vec![header_name.to_string()],
            header_fields: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Free-form name/value rows written between the header and the data
    /// (run parameters, device identity, ...).
    pub fn header_fields(&self) -> &[(String, String)] {
        &self.header_fields
    }

    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn add_header_field(&mut self, name: &str, value: &str) {
        self.header_fields
            .push((name.to_string(), value.to_string()));
    }

    /// Append one data point. `None` records a failed acquisition as an
    /// empty cell rather than dropping the row.
    pub fn add_data_point(&mut self, value: Option<f64>) {
        self.rows.push(vec![value]);
    }

    /// Merge another series as additional columns, justifying lengths with
    /// empty cells.
    pub fn join(mut self, other: Series) -> Series {
        let own_width = self.headers.len();
        let other_width = other.headers.len();
        let rows = self.rows.len().max(other.rows.len());

        self.rows.resize_with(rows, || vec![None; own_width]);
        let mut other_rows = other.rows;
        other_rows.resize_with(rows, || vec![None; other_width]);

        for (row, extra) in self.rows.iter_mut().zip(other_rows) {
            row.extend(extra);
        }
        self.headers.extend(other.headers);
        self.header_fields.extend(other.header_fields);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_column() {
        let mut volts = Series::new("v");
        volts.add_data_point(Some(1.0));
        volts.add_data_point(Some(2.0));
        assert_eq!(volts.len(), 2);
        assert_eq!(volts.headers(), ["v"]);
    }

    #[test]
    fn test_join_pads_shorter_side() {
        let mut volts = Series::new("v");
        volts.add_data_point(Some(1.0));
        volts.add_data_point(Some(2.0));
        let mut amps = Series::new("i");
        amps.add_data_point(Some(0.1));

        let joined = volts.join(amps);
        assert_eq!(joined.headers(), ["v", "i"]);
        assert_eq!(joined.rows().len(), 2);
        assert_eq!(joined.rows()[0], vec![Some(1.0), Some(0.1)]);
        assert_eq!(joined.rows()[1], vec![Some(2.0), None]);
    }

    #[test]
    fn test_join_three_columns() {
        let mut v = Series::new("v");
        v.add_data_point(Some(1.0));
        let mut i = Series::new("i");
        i.add_data_point(Some(0.5));
        let mut p = Series::new("p");
        p.add_data_point(Some(0.5));

        let joined = v.join(i).join(p);
        assert_eq!(joined.headers(), ["v", "i", "p"]);
        assert_eq!(joined.rows()[0], vec![Some(1.0), Some(0.5), Some(0.5)]);
    }

    #[test]
    fn test_header_fields_carried_through_join() {
        let mut v = Series::new("v");
        v.add_header_field("dut", "ips8200hq");
        let joined = v.join(Series::new("i"));
        assert_eq!(
            joined.header_fields(),
            [("dut".to_string(), "ips8200hq".to_string())]
        );
    }
}

use crate::jsonstat::DecodedTable;
use crate::table::Table;

impl From<DecodedTable> for Table {
    fn from(decoded: DecodedTable) -> Self {
        let mut table = Table::new(decoded.columns());

        for row in decoded.rows {
            let mut cells = Vec::with_capacity(table.columns.len());
            cells.push(row.value.map(|v| v.to_string()));
            for coordinate in row.coordinates {
                cells.push(coordinate.code);
                cells.push(coordinate.label);
            }
            table.rows.push(cells);
        }

        table
    }
}

#[test]
fn test_from_decoded_table() {
    use crate::jsonstat::{decode, Dimension};

    let dimensions = vec![
        Dimension::new("reporter", 1).category("ES", 0).label("ES", "Spain"),
        Dimension::new("time", 2).category("2019", 0).category("2020", 1),
    ];
    let raw = serde_json::json!(1234);
    let table = Table::from(decode(&dimensions, vec![(1, &raw)]).unwrap());

    assert_eq!(table.columns, vec!["value", "reporter", "reporter_label", "time", "time_label"]);
    assert_eq!(
        table.rows,
        vec![vec![
            Some("1234".to_owned()),
            Some("ES".to_owned()),
            Some("Spain".to_owned()),
            Some("2020".to_owned()),
            None
        ]]
    );
}

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Int64Array, NullArray, StringArray};
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, Field, Schema};
use fedq_common::{FedqError, Result};

use crate::row::{Row, ScalarValue};

/// Convert result rows into one Arrow batch with the given column order.
///
/// Column types are inferred from the first non-null value; a column with only nulls (or no
/// rows) becomes `Null`-typed. Mixed value types in one column are an error.
pub fn rows_to_record_batch(columns: &[String], rows: &[Row]) -> Result<RecordBatch> {
    let mut cols = vec![Vec::<&ScalarValue>::with_capacity(rows.len()); columns.len()];
    for row in rows {
        for (idx, name) in columns.iter().enumerate() {
            let v = row.get(name).ok_or_else(|| {
                FedqError::Execution(format!("column '{name}' missing from result row"))
            })?;
            cols[idx].push(v);
        }
    }

    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());
    for (name, values) in columns.iter().zip(&cols) {
        let data_type = infer_type(name, values)?;
        arrays.push(scalars_to_array(values, &data_type));
        fields.push(Field::new(name, data_type, true));
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .map_err(|e| FedqError::Execution(format!("result batch failed: {e}")))
}

fn infer_type(name: &str, values: &[&ScalarValue]) -> Result<DataType> {
    let mut ty = DataType::Null;
    for v in values {
        let this = match v {
            ScalarValue::Null => continue,
            ScalarValue::Boolean(_) => DataType::Boolean,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Utf8(_) => DataType::Utf8,
        };
        if ty == DataType::Null {
            ty = this;
        } else if ty != this {
            return Err(FedqError::Execution(format!(
                "column '{name}' mixes {ty} and {this} values"
            )));
        }
    }
    Ok(ty)
}

fn scalars_to_array(values: &[&ScalarValue], data_type: &DataType) -> ArrayRef {
    match data_type {
        DataType::Int64 => Arc::new(
            values
                .iter()
                .map(|v| v.as_i64())
                .collect::<Int64Array>(),
        ),
        DataType::Boolean => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    ScalarValue::Boolean(b) => Some(*b),
                    _ => None,
                })
                .collect::<BooleanArray>(),
        ),
        DataType::Utf8 => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    ScalarValue::Utf8(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect::<StringArray>(),
        ),
        _ => Arc::new(NullArray::new(values.len())),
    }
}

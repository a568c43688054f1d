use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

/// READY iff every segment of a FileRecord's `current_version` has a stored
/// signature (spec I4). Stored as the `ready_signed` small integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureState {
    NotReady,
    Ready,
}

impl ToSql for SignatureState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let n: i64 = match self {
            SignatureState::NotReady => 0,
            SignatureState::Ready => 1,
        };
        Ok(ToSqlOutput::from(n))
    }
}

impl FromSql for SignatureState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_i64()? {
            0 => Ok(SignatureState::NotReady),
            1 => Ok(SignatureState::Ready),
            n => Err(FromSqlError::OutOfRange(n)),
        }
    }
}

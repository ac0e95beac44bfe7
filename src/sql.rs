use chrono::{NaiveDate, NaiveTime};
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    UpsertRoom {
        id: Ulid,
        name: Option<String>,
        capacity: u32,
        status: RoomStatus,
    },
    SetRoomStatus {
        id: Ulid,
        status: RoomStatus,
    },
    SelectRooms,
    InsertBooking {
        id: Ulid,
        room_id: Ulid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        purpose: Option<String>,
    },
    UpdateBooking {
        id: Ulid,
        update: BookingUpdate,
    },
    /// `UPDATE bookings SET status = …`: approve, cancel or complete.
    SetBookingStatus {
        id: Ulid,
        status: BookingStatus,
    },
    DeleteBooking {
        id: Ulid,
    },
    SelectBooking {
        id: Ulid,
    },
    SelectBookings {
        filter: BookingFilter,
    },
    SelectSchedule {
        room_id: Ulid,
        date: NaiveDate,
    },
    SelectHistory {
        booking_id: Ulid,
    },
    SelectAvailability {
        room_id: Ulid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    },
    SelectFreeSlots {
        room_id: Ulid,
        date: NaiveDate,
        min_duration: Option<i64>,
    },
    ForgetUser {
        user_id: UserId,
    },
    SelectSummary,
    SelectCancellationRate,
    SelectPeakHours,
    SelectWeekdays,
    SelectTopUsers,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let stmt = match stmts.as_slice() {
        [] => return Err(SqlError::Empty),
        [stmt] => stmt,
        _ => {
            return Err(SqlError::Unsupported(format!(
                "{} statements in one query, expected one",
                stmts.len()
            )));
        }
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(&table.relation, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "rooms" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("rooms", 3, values.len()));
            }
            let status = match values.get(3) {
                Some(v) => parse_status(v)?,
                None => RoomStatus::Available,
            };
            Ok(Command::UpsertRoom {
                id: parse_ulid(&values[0])?,
                name: parse_string_or_null(&values[1])?,
                capacity: parse_u32(&values[2])?,
                status,
            })
        }
        "bookings" => {
            if values.len() < 5 {
                return Err(SqlError::WrongArity("bookings", 5, values.len()));
            }
            let purpose = match values.get(5) {
                Some(v) => parse_string_or_null(v)?,
                None => None,
            };
            Ok(Command::InsertBooking {
                id: parse_ulid(&values[0])?,
                room_id: parse_ulid(&values[1])?,
                date: parse_date(&values[2])?,
                start: parse_time(&values[3])?,
                end: parse_time(&values[4])?,
                purpose,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    let id_filter = || extract_where_id(selection);

    let mut sets = Vec::with_capacity(assignments.len());
    for a in assignments {
        let column = match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        sets.push((column, &a.value));
    }

    match table.as_str() {
        "rooms" => match sets.as_slice() {
            [(col, value)] if col == "status" => Ok(Command::SetRoomStatus {
                id: id_filter()?,
                status: parse_status(value)?,
            }),
            _ => Err(SqlError::Unsupported(
                "only status can be updated on rooms".into(),
            )),
        },
        "bookings" => {
            if let [(col, value)] = sets.as_slice()
                && col == "status"
            {
                return Ok(Command::SetBookingStatus {
                    id: id_filter()?,
                    status: parse_status(value)?,
                });
            }
            let mut update = BookingUpdate::default();
            for (col, value) in &sets {
                match col.as_str() {
                    "start_time" => update.start = Some(parse_time(value)?),
                    "end_time" => update.end = Some(parse_time(value)?),
                    "purpose" => {
                        update.purpose = Some(parse_string_or_null(value)?.unwrap_or_default())
                    }
                    "status" => {
                        return Err(SqlError::Unsupported(
                            "status cannot be combined with other columns".into(),
                        ));
                    }
                    other => return Err(SqlError::Unsupported(format!("cannot update {other}"))),
                }
            }
            Ok(Command::UpdateBooking {
                id: id_filter()?,
                update,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;

    match table.as_str() {
        "bookings" => Ok(Command::DeleteBooking {
            id: extract_where_id(&delete.selection)?,
        }),
        "users" => {
            let filters = where_equalities(&delete.selection)?;
            let value = required(&filters, "id")?;
            let user_id = u64::try_from(parse_i64_expr(value)?)
                .map_err(|_| SqlError::Parse("user id must not be negative".into()))?;
            Ok(Command::ForgetUser { user_id })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;
    let filters = where_equalities(&select.selection)?;

    match table.as_str() {
        "rooms" => Ok(Command::SelectRooms),
        "bookings" => {
            let mut filter = BookingFilter::default();
            for (col, value) in &filters {
                match col.as_str() {
                    "id" => {
                        return Ok(Command::SelectBooking {
                            id: parse_ulid(value)?,
                        });
                    }
                    "room_id" => filter.room_id = Some(parse_ulid(value)?),
                    "date" => filter.date = Some(parse_date(value)?),
                    "status" => filter.status = Some(parse_status(value)?),
                    "user_id" => {
                        filter.user_id = Some(
                            u64::try_from(parse_i64_expr(value)?)
                                .map_err(|_| SqlError::Parse("bad user_id".into()))?,
                        )
                    }
                    other => return Err(SqlError::Unsupported(format!("filter on {other}"))),
                }
            }
            Ok(Command::SelectBookings { filter })
        }
        "schedule" => Ok(Command::SelectSchedule {
            room_id: parse_ulid(required(&filters, "room_id")?)?,
            date: parse_date(required(&filters, "date")?)?,
        }),
        "booking_history" => Ok(Command::SelectHistory {
            booking_id: parse_ulid(required(&filters, "booking_id")?)?,
        }),
        "availability" => Ok(Command::SelectAvailability {
            room_id: parse_ulid(required(&filters, "room_id")?)?,
            date: parse_date(required(&filters, "date")?)?,
            start: parse_time(required(&filters, "start_time")?)?,
            end: parse_time(required(&filters, "end_time")?)?,
        }),
        "free_slots" => Ok(Command::SelectFreeSlots {
            room_id: parse_ulid(required(&filters, "room_id")?)?,
            date: parse_date(required(&filters, "date")?)?,
            min_duration: optional(&filters, "min_duration")
                .map(parse_i64_expr)
                .transpose()?,
        }),
        "booking_summary" | "cancellation_rate" | "peak_hours" | "bookings_by_weekday"
        | "top_users" => {
            if let Some((col, _)) = filters.first() {
                return Err(SqlError::Unsupported(format!("filter on {col} in {table}")));
            }
            Ok(match table.as_str() {
                "booking_summary" => Command::SelectSummary,
                "cancellation_rate" => Command::SelectCancellationRate,
                "peak_hours" => Command::SelectPeakHours,
                "bookings_by_weekday" => Command::SelectWeekdays,
                _ => Command::SelectTopUsers,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── Helpers ───────────────────────────────────────────────────

/// Flatten `a = x AND b = y AND …` into `[(a, x), (b, y), …]`.
fn where_equalities(selection: &Option<Expr>) -> Result<Vec<(String, &Expr)>, SqlError> {
    fn walk<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
        match expr {
            Expr::BinaryOp {
                left,
                op: ast::BinaryOperator::And,
                right,
            } => {
                walk(left, out)?;
                walk(right, out)
            }
            Expr::BinaryOp {
                left,
                op: ast::BinaryOperator::Eq,
                right,
            } => {
                let col = expr_column_name(left)
                    .ok_or_else(|| SqlError::Parse(format!("expected column, got {left}")))?;
                out.push((col, right.as_ref()));
                Ok(())
            }
            Expr::Nested(inner) => walk(inner, out),
            other => Err(SqlError::Unsupported(format!("WHERE clause: {other}"))),
        }
    }

    let mut out = Vec::new();
    if let Some(expr) = selection {
        walk(expr, &mut out)?;
    }
    Ok(out)
}

fn optional<'a>(filters: &[(String, &'a Expr)], column: &str) -> Option<&'a Expr> {
    filters.iter().find(|(c, _)| c == column).map(|(_, e)| *e)
}

fn required<'a>(filters: &[(String, &'a Expr)], column: &'static str) -> Result<&'a Expr, SqlError> {
    optional(filters, column).ok_or(SqlError::MissingFilter(column))
}

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [row] => Ok(row.clone()),
            [] => Err(SqlError::Parse("empty VALUES".into())),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let filters = where_equalities(selection)?;
    match filters.as_slice() {
        [(col, value)] if col == "id" => parse_ulid(value),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

/// String-ish literal: quoted strings and bare numbers.
fn literal_text(expr: &Expr) -> Result<&str, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => Ok(s.as_str()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = literal_text(expr)?;
    Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID {s:?}: {e}")))
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = literal_text(expr)?;
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| SqlError::Parse(format!("bad date {s:?}: {e}")))
}

/// `HH:MM:SS` or `HH:MM`.
fn parse_time(expr: &Expr) -> Result<NaiveTime, SqlError> {
    let s = literal_text(expr)?;
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|e| SqlError::Parse(format!("bad time {s:?}: {e}")))
}

fn parse_status<T>(expr: &Expr) -> Result<T, SqlError>
where
    T: std::str::FromStr<Err = String>,
{
    literal_text(expr)?.parse().map_err(SqlError::Parse)
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => literal_text(expr).map(|s| Some(s.to_string())),
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64_expr(expr)?);
    }
    let s = literal_text(expr)?;
    s.parse()
        .map_err(|e| SqlError::Parse(format!("bad integer {s:?}: {e}")))
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected at least {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tracing::debug;

use crate::auth::{RoombookAuthSource, parse_identity};
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{
    AUTH_FAILURES_TOTAL, QUERIES_TOTAL, QUERY_DURATION_SECONDS, command_label,
};
use crate::sql::{self, Command};

pub struct RoombookHandler {
    engine: Arc<Engine>,
    query_parser: Arc<RoombookQueryParser>,
}

impl RoombookHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(RoombookQueryParser),
        }
    }

    /// The caller's identity, taken from the startup `user` parameter.
    fn resolve_actor<C: ClientInfo>(&self, client: &C) -> PgWireResult<Actor> {
        let user = client
            .metadata()
            .get("user")
            .cloned()
            .unwrap_or_default();
        parse_identity(&user).map_err(|e| {
            metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
            user_error("28000", format!("bad identity {user:?}: {e}"))
        })
    }

    async fn run(&self, actor: &Actor, sql_text: &str) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(sql_text).map_err(sql_err)?;
        let label = command_label(&cmd);
        let start = Instant::now();
        let result = self.execute_command(actor, cmd).await;
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        result
    }

    async fn execute_command(&self, actor: &Actor, cmd: Command) -> PgWireResult<Response> {
        let engine = &self.engine;
        match cmd {
            Command::UpsertRoom {
                id,
                name,
                capacity,
                status,
            } => {
                engine
                    .upsert_room(actor, id, name, capacity, status)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::SetRoomStatus { id, status } => {
                engine
                    .set_room_status(actor, id, status)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::SelectRooms => {
                let rooms = engine.list_rooms().await.map_err(engine_err)?;
                let schema = Arc::new(rooms_schema());
                let rows: Vec<PgWireResult<_>> = rooms
                    .iter()
                    .map(|room| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&room.id.to_string())?;
                        encoder.encode_field(&room.name)?;
                        encoder.encode_field(&i64::from(room.capacity))?;
                        encoder.encode_field(&room.status.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(query_response(schema, rows))
            }
            Command::InsertBooking {
                id,
                room_id,
                date,
                start,
                end,
                purpose,
            } => {
                engine
                    .create_booking(actor, id, room_id, date, Span::new(start, end), purpose)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::UpdateBooking { id, update } => {
                engine
                    .update_booking(actor, id, update)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::SetBookingStatus { id, status } => {
                let result = match status {
                    BookingStatus::Confirmed => engine.approve_booking(actor, id).await,
                    BookingStatus::Cancelled => engine.cancel_booking(actor, id).await,
                    BookingStatus::Completed => engine.complete_booking(actor, id).await,
                    BookingStatus::Pending => Err(EngineError::Validation(
                        "a booking cannot be moved back to pending".into(),
                    )),
                };
                result.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteBooking { id } => {
                engine.cancel_booking(actor, id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectBooking { id } => {
                let booking = engine.get_booking(actor, id).await.map_err(engine_err)?;
                Ok(bookings_response(&[booking]))
            }
            Command::SelectBookings { filter } => {
                let bookings = engine
                    .list_bookings(actor, filter)
                    .await
                    .map_err(engine_err)?;
                Ok(bookings_response(&bookings))
            }
            Command::SelectSchedule { room_id, date } => {
                let bookings = engine
                    .room_schedule(room_id, date)
                    .await
                    .map_err(engine_err)?;
                Ok(bookings_response(&bookings))
            }
            Command::SelectHistory { booking_id } => {
                let history = engine
                    .get_booking_history(actor, booking_id)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(history_schema());
                let rows: Vec<PgWireResult<_>> = history
                    .iter()
                    .map(|entry| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&entry.id.to_string())?;
                        encoder.encode_field(&entry.booking_id.to_string())?;
                        encoder.encode_field(&entry.room_id.to_string())?;
                        encoder.encode_field(&(entry.user_id as i64))?;
                        encoder.encode_field(&entry.action.to_string())?;
                        encoder.encode_field(&entry.changed_by.map(|u| u as i64))?;
                        encoder.encode_field(&entry.previous.map(|s| s.start.to_string()))?;
                        encoder.encode_field(&entry.previous.map(|s| s.end.to_string()))?;
                        encoder.encode_field(&entry.new.map(|s| s.start.to_string()))?;
                        encoder.encode_field(&entry.new.map(|s| s.end.to_string()))?;
                        encoder.encode_field(&entry.timestamp)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(query_response(schema, rows))
            }
            Command::SelectAvailability {
                room_id,
                date,
                start,
                end,
            } => {
                let report = engine
                    .check_room_availability(room_id, date, Span::new(start, end))
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(availability_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&report.room_id.to_string())?;
                encoder.encode_field(&report.date.to_string())?;
                encoder.encode_field(&report.span.start.to_string())?;
                encoder.encode_field(&report.span.end.to_string())?;
                encoder.encode_field(&report.available())?;
                encoder.encode_field(&report.room_status.to_string())?;
                encoder.encode_field(&report.conflict.map(|(id, _)| id.to_string()))?;
                Ok(query_response(schema, vec![Ok(encoder.take_row())]))
            }
            Command::SelectFreeSlots {
                room_id,
                date,
                min_duration,
            } => {
                let slots = engine
                    .free_slots(room_id, date, min_duration)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(free_slots_schema());
                let rid_str = room_id.to_string();
                let date_str = date.to_string();
                let rows: Vec<PgWireResult<_>> = slots
                    .into_iter()
                    .map(|slot| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&rid_str)?;
                        encoder.encode_field(&date_str)?;
                        encoder.encode_field(&slot.start.to_string())?;
                        encoder.encode_field(&slot.end.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(query_response(schema, rows))
            }
            Command::ForgetUser { user_id } => {
                let cleared = engine
                    .forget_user(actor, user_id)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(cleared)))
            }
            Command::SelectSummary => {
                let summary = engine.booking_summary(actor).await.map_err(engine_err)?;
                let schema = Arc::new(summary_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&summary.scope.as_str())?;
                encoder.encode_field(&(summary.total as i64))?;
                encoder.encode_field(&(summary.pending as i64))?;
                encoder.encode_field(&(summary.confirmed as i64))?;
                encoder.encode_field(&(summary.cancelled as i64))?;
                encoder.encode_field(&(summary.completed as i64))?;
                encoder.encode_field(&(summary.this_month as i64))?;
                encoder.encode_field(&(summary.last_month as i64))?;
                encoder.encode_field(&summary.growth_percent)?;
                encoder.encode_field(&summary.avg_per_user)?;
                Ok(query_response(schema, vec![Ok(encoder.take_row())]))
            }
            Command::SelectCancellationRate => {
                let report = engine.cancellation_rate(actor).await.map_err(engine_err)?;
                let schema = Arc::new(cancellation_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&report.scope.as_str())?;
                encoder.encode_field(&(report.total as i64))?;
                encoder.encode_field(&(report.cancelled as i64))?;
                encoder.encode_field(&report.rate_percent)?;
                encoder.encode_field(&report.health.as_str())?;
                Ok(query_response(schema, vec![Ok(encoder.take_row())]))
            }
            Command::SelectPeakHours => {
                let (scope, hours) = engine.peak_hours(actor).await.map_err(engine_err)?;
                let schema = Arc::new(peak_hours_schema());
                let rows: Vec<PgWireResult<_>> = hours
                    .iter()
                    .map(|h| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&scope.as_str())?;
                        encoder.encode_field(&i64::from(h.hour))?;
                        encoder.encode_field(&(h.bookings as i64))?;
                        encoder.encode_field(&h.percent)?;
                        encoder.encode_field(&h.popularity.as_str())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(query_response(schema, rows))
            }
            Command::SelectWeekdays => {
                let (scope, days) = engine
                    .bookings_by_weekday(actor)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(weekday_schema());
                let rows: Vec<PgWireResult<_>> = days
                    .iter()
                    .map(|w| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&scope.as_str())?;
                        encoder.encode_field(&i64::from(w.weekday.num_days_from_sunday()))?;
                        encoder.encode_field(&w.day_name())?;
                        encoder.encode_field(&(w.bookings as i64))?;
                        encoder.encode_field(&w.percent)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(query_response(schema, rows))
            }
            Command::SelectTopUsers => {
                let users = engine
                    .top_users(actor, TOP_USERS_LIMIT)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(top_users_schema());
                let rows: Vec<PgWireResult<_>> = users
                    .iter()
                    .map(|u| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&(u.user_id as i64))?;
                        encoder.encode_field(&(u.bookings as i64))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(query_response(schema, rows))
            }
        }
    }
}

const TOP_USERS_LIMIT: usize = 5;

fn query_response(
    schema: Arc<Vec<FieldInfo>>,
    rows: Vec<PgWireResult<pgwire::messages::data::DataRow>>,
) -> Response {
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn bookings_response(bookings: &[Booking]) -> Response {
    let schema = Arc::new(bookings_schema());
    let rows: Vec<PgWireResult<_>> = bookings
        .iter()
        .map(|b| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&b.id.to_string())?;
            encoder.encode_field(&b.room_id.to_string())?;
            encoder.encode_field(&(b.user_id as i64))?;
            encoder.encode_field(&b.date.to_string())?;
            encoder.encode_field(&b.span.start.to_string())?;
            encoder.encode_field(&b.span.end.to_string())?;
            encoder.encode_field(&b.status.to_string())?;
            encoder.encode_field(&b.purpose)?;
            encoder.encode_field(&b.created_at)?;
            encoder.encode_field(&b.updated_at)?;
            encoder.encode_field(&b.cancelled_at)?;
            encoder.encode_field(&b.cancelled_by.map(|u| u as i64))?;
            Ok(encoder.take_row())
        })
        .collect();
    query_response(schema, rows)
}

// ── Row schemas ──────────────────────────────────────────────────

fn text(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int8(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn float8(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::FLOAT8, FieldFormat::Text)
}

fn rooms_schema() -> Vec<FieldInfo> {
    vec![text("id"), text("name"), int8("capacity"), text("status")]
}

fn bookings_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("room_id"),
        int8("user_id"),
        text("date"),
        text("start_time"),
        text("end_time"),
        text("status"),
        text("purpose"),
        int8("created_at"),
        int8("updated_at"),
        int8("cancelled_at"),
        int8("cancelled_by"),
    ]
}

fn history_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("booking_id"),
        text("room_id"),
        int8("user_id"),
        text("action"),
        int8("changed_by"),
        text("previous_start"),
        text("previous_end"),
        text("new_start"),
        text("new_end"),
        int8("timestamp"),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        text("room_id"),
        text("date"),
        text("start_time"),
        text("end_time"),
        FieldInfo::new("available".into(), None, None, Type::BOOL, FieldFormat::Text),
        text("room_status"),
        text("conflict_id"),
    ]
}

fn free_slots_schema() -> Vec<FieldInfo> {
    vec![
        text("room_id"),
        text("date"),
        text("start_time"),
        text("end_time"),
    ]
}

fn summary_schema() -> Vec<FieldInfo> {
    vec![
        text("scope"),
        int8("total"),
        int8("pending"),
        int8("confirmed"),
        int8("cancelled"),
        int8("completed"),
        int8("this_month"),
        int8("last_month"),
        float8("growth_percent"),
        float8("avg_per_user"),
    ]
}

fn cancellation_schema() -> Vec<FieldInfo> {
    vec![
        text("scope"),
        int8("total"),
        int8("cancelled"),
        float8("rate_percent"),
        text("health"),
    ]
}

fn peak_hours_schema() -> Vec<FieldInfo> {
    vec![
        text("scope"),
        int8("hour"),
        int8("bookings"),
        float8("percent"),
        text("popularity"),
    ]
}

fn weekday_schema() -> Vec<FieldInfo> {
    vec![
        text("scope"),
        int8("day_number"),
        text("day_name"),
        int8("bookings"),
        float8("percent"),
    ]
}

fn top_users_schema() -> Vec<FieldInfo> {
    vec![int8("user_id"), int8("bookings")]
}

/// Result columns of a statement, judged by the table after `FROM`.
/// Non-SELECT statements return no rows.
fn result_schema(sql_text: &str) -> Vec<FieldInfo> {
    let lower = sql_text.trim_start().to_lowercase();
    if !lower.starts_with("select") {
        return vec![];
    }
    let table = lower
        .split_whitespace()
        .skip_while(|w| *w != "from")
        .nth(1)
        .unwrap_or_default()
        .trim_end_matches(';');
    match table {
        "rooms" => rooms_schema(),
        "bookings" | "schedule" => bookings_schema(),
        "booking_history" => history_schema(),
        "availability" => availability_schema(),
        "free_slots" => free_slots_schema(),
        "booking_summary" => summary_schema(),
        "cancellation_rate" => cancellation_schema(),
        "peak_hours" => peak_hours_schema(),
        "bookings_by_weekday" => weekday_schema(),
        "top_users" => top_users_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for RoombookHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let actor = self.resolve_actor(client)?;
        debug!("{actor}: {query}");
        Ok(vec![self.run(&actor, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct RoombookQueryParser;

#[async_trait]
impl QueryParser for RoombookQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for RoombookHandler {
    type Statement = String;
    type QueryParser = RoombookQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let actor = self.resolve_actor(client)?;
        let sql_text = substitute_params(portal);
        debug!("{actor}: {sql_text}");
        self.run(&actor, &sql_text).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    substitute(&portal.statement.statement, &portal.parameters)
}

/// Single left-to-right pass: each `$N` is read whole, so `$1` never eats
/// the prefix of `$10`, and inserted values are never scanned again.
/// Placeholders without a bound value are left as written.
fn substitute(sql_text: &str, params: &[Option<Bytes>]) -> String {
    let bytes = sql_text.as_bytes();
    let mut result = String::with_capacity(sql_text.len());
    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        let start = i + 1;
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        let param = sql_text[start..end]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| params.get(idx));
        if let Some(param) = param {
            result.push_str(&sql_text[copied..i]);
            match param {
                Some(value) => {
                    let text = String::from_utf8_lossy(value);
                    result.push('\'');
                    result.push_str(&text.replace('\'', "''"));
                    result.push('\'');
                }
                None => result.push_str("NULL"),
            }
            copied = end;
        }
        i = end;
    }
    result.push_str(&sql_text[copied..]);
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct RoombookFactory {
    handler: Arc<RoombookHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<RoombookAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl RoombookFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        let auth_source = RoombookAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(RoombookHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for RoombookFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(RoombookFactory::new(engine, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(e.sqlstate(), e.to_string())
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}

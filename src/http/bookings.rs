use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::AppState;
use super::error::{ApiError, ApiResult};
use super::extract::{Caller, JsonBody, PathParam, QueryParams, TenantEngine};
use crate::engine::{NewBooking, PageRequest};
use crate::model::{ApartmentId, Booking, BookingId, BookingState, RenterId, Stay};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bookings", axum::routing::post(create_booking))
        .route("/bookings/{id}", get(get_booking).delete(cancel_booking))
        .route("/bookings/{id}/dates", put(change_dates))
        .route("/bookings/user/{user_id}", get(list_by_renter))
        .route("/bookings/apartment/{apartment_id}", get(list_by_apartment))
        .route("/bookings/private/unavailable", get(unavailable_apartments))
        .route("/bookings/private/{id}/exists", get(booking_exists))
}

// ── DTOs ─────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub renter_id: RenterId,
    pub apartment_id: ApartmentId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[validate(range(min = 1, max = 10, message = "guests must be between 1 and 10"))]
    pub guests: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub id: BookingId,
    pub renter_id: RenterId,
    pub apartment_id: ApartmentId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
    pub state: BookingState,
    pub guests: u8,
    pub created_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            renter_id: b.renter_id,
            apartment_id: b.apartment_id,
            start_date: b.stay.start,
            end_date: b.stay.end,
            cost: b.cost,
            state: b.state,
            guests: b.guests,
            created_at: b.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl From<PageQuery> for PageRequest {
    fn from(q: PageQuery) -> Self {
        PageRequest::new(q.page, q.page_size)
    }
}

#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

/// 204 for an empty page, 200 with the bookings otherwise.
fn listing(bookings: Vec<Booking>) -> Response {
    if bookings.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    let body: Vec<BookingResponse> = bookings.into_iter().map(Into::into).collect();
    Json(body).into_response()
}

// ── Handlers ─────────────────────────────────────────────

async fn create_booking(
    TenantEngine(engine): TenantEngine,
    Caller(email): Caller,
    JsonBody(body): JsonBody<CreateBookingRequest>,
) -> ApiResult<(StatusCode, Json<BookingResponse>)> {
    body.validate()?;
    let guests = u8::try_from(body.guests)
        .map_err(|_| ApiError::Validation("guests must be between 1 and 10".into()))?;
    let req = NewBooking {
        renter_id: body.renter_id,
        apartment_id: body.apartment_id,
        start: body.start_date,
        end: body.end_date,
        guests,
    };
    let booking = engine.create_booking(req, &email).await?;
    Ok((StatusCode::CREATED, Json(booking.into())))
}

async fn get_booking(
    TenantEngine(engine): TenantEngine,
    Caller(email): Caller,
    PathParam(id): PathParam<BookingId>,
) -> ApiResult<Json<BookingResponse>> {
    Ok(Json(engine.get_booking(id, &email).await?.into()))
}

async fn cancel_booking(
    TenantEngine(engine): TenantEngine,
    Caller(email): Caller,
    PathParam(id): PathParam<BookingId>,
) -> ApiResult<Json<BookingResponse>> {
    Ok(Json(engine.cancel_booking(id, &email).await?.into()))
}

async fn change_dates(
    TenantEngine(engine): TenantEngine,
    Caller(email): Caller,
    PathParam(id): PathParam<BookingId>,
    QueryParams(range): QueryParams<DateRangeQuery>,
) -> ApiResult<Json<BookingResponse>> {
    let booking = engine
        .change_booking_dates(id, range.start_date, range.end_date, &email)
        .await?;
    Ok(Json(booking.into()))
}

async fn list_by_renter(
    TenantEngine(engine): TenantEngine,
    Caller(email): Caller,
    PathParam(renter_id): PathParam<RenterId>,
    QueryParams(page): QueryParams<PageQuery>,
) -> ApiResult<Response> {
    let bookings = engine.list_by_renter(renter_id, &email, page.into()).await?;
    Ok(listing(bookings))
}

async fn list_by_apartment(
    TenantEngine(engine): TenantEngine,
    PathParam(apartment_id): PathParam<ApartmentId>,
    QueryParams(page): QueryParams<PageQuery>,
) -> Response {
    listing(engine.list_by_apartment(apartment_id, page.into()).await)
}

async fn unavailable_apartments(
    TenantEngine(engine): TenantEngine,
    QueryParams(range): QueryParams<DateRangeQuery>,
) -> ApiResult<Json<Vec<ApartmentId>>> {
    let stay = Stay::checked(range.start_date, range.end_date)
        .ok_or_else(|| ApiError::Validation("endDate must be after startDate".into()))?;
    let taken = engine.unavailable_apartments(&stay).await;
    Ok(Json(taken.into_iter().collect()))
}

async fn booking_exists(
    TenantEngine(engine): TenantEngine,
    PathParam(id): PathParam<BookingId>,
) -> Json<ExistsResponse> {
    Json(ExistsResponse {
        exists: engine.booking_exists(id),
    })
}

use axum::extract::State;
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::models::{
    SupportTicket, TicketCategory, TicketFilters, TicketStatus, UpdateSupportTicket,
};
use crate::pagination::{Paginated, PaginationQuery};

#[derive(Debug, Deserialize)]
pub struct ListTicketsQuery {
    pub status: Option<TicketStatus>,
    pub category: Option<TicketCategory>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_support_tickets(
    State(state): State<AppState>,
    Query(query): Query<ListTicketsQuery>,
) -> Result<Json<Paginated<SupportTicket>>> {
    let page = PaginationQuery {
        limit: query.limit,
        offset: query.offset,
    };
    let filters = TicketFilters {
        status: query.status,
        category: query.category,
    };

    let conn = state.db.get()?;
    let (items, total) =
        queries::list_support_tickets(&conn, &filters, page.limit(), page.offset())?;
    Ok(Json(Paginated::from_query(items, total, &page)))
}

pub async fn update_support_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateSupportTicket>,
) -> Result<Json<SupportTicket>> {
    let conn = state.db.get()?;
    let ticket = queries::update_support_ticket_status(&conn, &id, input.status)?
        .or_not_found(msg::TICKET_NOT_FOUND)?;
    Ok(Json(ticket))
}

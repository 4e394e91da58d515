use axum::{extract::State, http::StatusCode};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::middleware::MaybeAccount;
use crate::models::{CreateSupportTicket, MESSAGE_MAX_CHARS, SUBJECT_MAX_CHARS, SupportTicket};
use crate::util::is_plausible_email;

fn validate_ticket(input: &CreateSupportTicket) -> Result<()> {
    let subject = input.subject.trim();
    if subject.is_empty() || subject.chars().count() > SUBJECT_MAX_CHARS {
        return Err(AppError::BadRequest(format!(
            "Subject must be 1-{} characters",
            SUBJECT_MAX_CHARS
        )));
    }
    let message = input.message.trim();
    if message.is_empty() || message.chars().count() > MESSAGE_MAX_CHARS {
        return Err(AppError::BadRequest(format!(
            "Message must be 1-{} characters",
            MESSAGE_MAX_CHARS
        )));
    }
    Ok(())
}

/// Open a support ticket. Signed-in users are linked to their account;
/// anonymous senders must leave a contact email.
pub async fn create_support_ticket(
    State(state): State<AppState>,
    MaybeAccount(ctx): MaybeAccount,
    Json(input): Json<CreateSupportTicket>,
) -> Result<(StatusCode, Json<SupportTicket>)> {
    validate_ticket(&input)?;

    let (account_id, email) = match &ctx {
        Some(ctx) => (Some(ctx.account.id.as_str()), Some(ctx.account.email.clone())),
        None => {
            let email = input
                .email
                .as_deref()
                .map(str::trim)
                .filter(|e| is_plausible_email(e))
                .ok_or_else(|| AppError::BadRequest("A contact email is required".into()))?;
            (None, Some(email.to_string()))
        }
    };

    let conn = state.db.get()?;
    let ticket = queries::create_support_ticket(&conn, account_id, email.as_deref(), &input)?;
    tracing::info!(
        "Support ticket {} opened ({})",
        ticket.id,
        ticket.category.as_ref()
    );
    Ok((StatusCode::CREATED, Json(ticket)))
}

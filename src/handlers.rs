// SPDX-License-Identifier: Apache-2.0
use actix_session::Session;
use actix_web::http::header::{self, ContentType};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{info, instrument};

use crate::app::Application;
use crate::csrf::csrf_token;
use crate::error::ServerError;
use crate::forms::{AccountPasswordUpdateForm, SnippetCreateForm, UserLoginForm, UserSignupForm};
use crate::middleware::{is_authenticated, LOGIN_PATH};
use crate::models::ModelError;
use crate::session::{AUTHENTICATED_USER_ID, FLASH, REDIRECT_PATH_AFTER_LOGIN};
use crate::templates::{self, Page, TemplateData};

const DEFAULT_PATH_AFTER_LOGIN: &str = "/snippet/create";

fn template_data(req: &HttpRequest, session: &Session) -> Result<TemplateData, ServerError> {
    let flash = match session.remove_as::<String>(FLASH) {
        Some(Ok(flash)) => Some(flash),
        _ => None,
    };
    let token = csrf_token(session)?;
    Ok(TemplateData::new(flash, is_authenticated(req), token))
}

fn render(status: StatusCode, page: Page<'_>, data: &TemplateData) -> HttpResponse {
    HttpResponse::build(status)
        .content_type(ContentType::html())
        .body(templates::render(&page, data))
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, location))
        .finish()
}

/// Only same-site absolute paths are followed after login.
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\")
}

fn session_user_id(session: &Session) -> Result<Option<i64>, ServerError> {
    Ok(session.get::<i64>(AUTHENTICATED_USER_ID)?)
}

/// Liveness probe; bypasses sessions entirely.
pub async fn ping() -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body("OK")
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound()
        .content_type(ContentType::plaintext())
        .body("Not Found")
}

pub async fn home(
    req: HttpRequest,
    session: Session,
    app: web::Data<Application>,
) -> Result<HttpResponse, ServerError> {
    let snippets = app.snippets.latest().await?;
    let data = template_data(&req, &session)?;
    Ok(render(StatusCode::OK, Page::Home(&snippets), &data))
}

pub async fn about(req: HttpRequest, session: Session) -> Result<HttpResponse, ServerError> {
    let data = template_data(&req, &session)?;
    Ok(render(StatusCode::OK, Page::About, &data))
}

pub async fn snippet_view(
    req: HttpRequest,
    session: Session,
    app: web::Data<Application>,
    id: web::Path<String>,
) -> Result<HttpResponse, ServerError> {
    let id = match id.parse::<i64>() {
        Ok(id) if id >= 1 => id,
        _ => return Err(ServerError::NotFound),
    };

    let snippet = app.snippets.get(id).await?;
    let data = template_data(&req, &session)?;
    Ok(render(StatusCode::OK, Page::View(&snippet), &data))
}

pub async fn snippet_create(req: HttpRequest, session: Session) -> Result<HttpResponse, ServerError> {
    let data = template_data(&req, &session)?;
    Ok(render(StatusCode::OK, Page::Create(&SnippetCreateForm::default()), &data))
}

pub async fn snippet_create_post(
    req: HttpRequest,
    session: Session,
    app: web::Data<Application>,
    form: web::Form<SnippetCreateForm>,
) -> Result<HttpResponse, ServerError> {
    let mut form = form.into_inner();
    if !form.validate() {
        let data = template_data(&req, &session)?;
        return Ok(render(StatusCode::UNPROCESSABLE_ENTITY, Page::Create(&form), &data));
    }

    let id = app
        .snippets
        .insert(&form.title, &form.content, form.expires)
        .await?;
    session.insert(FLASH, "Snippet successfully created!")?;
    Ok(see_other(&format!("/snippet/view/{id}")))
}

pub async fn user_signup(req: HttpRequest, session: Session) -> Result<HttpResponse, ServerError> {
    let data = template_data(&req, &session)?;
    Ok(render(StatusCode::OK, Page::Signup(&UserSignupForm::default()), &data))
}

#[instrument(skip_all)]
pub async fn user_signup_post(
    req: HttpRequest,
    session: Session,
    app: web::Data<Application>,
    form: web::Form<UserSignupForm>,
) -> Result<HttpResponse, ServerError> {
    let mut form = form.into_inner();

    if form.validate() {
        match app.users.insert(&form.name, &form.email, &form.password).await {
            Ok(id) => {
                info!(user_id = id, "User signed up");
                session.insert(FLASH, "Your signup was successful. Please log in.")?;
                return Ok(see_other(LOGIN_PATH));
            }
            Err(ModelError::DuplicateEmail) => form
                .validator
                .add_field_error("email", "Email address is already in use"),
            Err(e) => return Err(e.into()),
        }
    }

    let data = template_data(&req, &session)?;
    Ok(render(StatusCode::UNPROCESSABLE_ENTITY, Page::Signup(&form), &data))
}

pub async fn user_login(req: HttpRequest, session: Session) -> Result<HttpResponse, ServerError> {
    let data = template_data(&req, &session)?;
    Ok(render(StatusCode::OK, Page::Login(&UserLoginForm::default()), &data))
}

#[instrument(skip_all)]
pub async fn user_login_post(
    req: HttpRequest,
    session: Session,
    app: web::Data<Application>,
    form: web::Form<UserLoginForm>,
) -> Result<HttpResponse, ServerError> {
    let mut form = form.into_inner();

    if form.validate() {
        match app.users.authenticate(&form.email, &form.password).await {
            Ok(id) => {
                // New token on privilege change.
                session.renew();
                session.insert(AUTHENTICATED_USER_ID, id)?;
                info!(user_id = id, "User logged in");

                let next = match session.remove_as::<String>(REDIRECT_PATH_AFTER_LOGIN) {
                    Some(Ok(path)) if is_local_path(&path) => path,
                    _ => DEFAULT_PATH_AFTER_LOGIN.to_owned(),
                };
                return Ok(see_other(&next));
            }
            Err(ModelError::InvalidCredentials) => form
                .validator
                .add_non_field_error("Email or password is incorrect"),
            Err(e) => return Err(e.into()),
        }
    }

    let data = template_data(&req, &session)?;
    Ok(render(StatusCode::UNPROCESSABLE_ENTITY, Page::Login(&form), &data))
}

pub async fn user_logout_post(session: Session) -> Result<HttpResponse, ServerError> {
    session.renew();
    session.remove(AUTHENTICATED_USER_ID);
    session.insert(FLASH, "You've been logged out successfully!")?;
    Ok(see_other("/"))
}

pub async fn account_view(
    req: HttpRequest,
    session: Session,
    app: web::Data<Application>,
) -> Result<HttpResponse, ServerError> {
    let Some(id) = session_user_id(&session)? else {
        return Ok(see_other(LOGIN_PATH));
    };

    let user = match app.users.get(id).await {
        Ok(user) => user,
        Err(ModelError::NoRecord) => return Ok(see_other(LOGIN_PATH)),
        Err(e) => return Err(e.into()),
    };

    let data = template_data(&req, &session)?;
    Ok(render(StatusCode::OK, Page::Account(&user), &data))
}

pub async fn account_password_update(
    req: HttpRequest,
    session: Session,
) -> Result<HttpResponse, ServerError> {
    let data = template_data(&req, &session)?;
    let form = AccountPasswordUpdateForm::default();
    Ok(render(StatusCode::OK, Page::PasswordUpdate(&form), &data))
}

pub async fn account_password_update_post(
    req: HttpRequest,
    session: Session,
    app: web::Data<Application>,
    form: web::Form<AccountPasswordUpdateForm>,
) -> Result<HttpResponse, ServerError> {
    let mut form = form.into_inner();
    let Some(id) = session_user_id(&session)? else {
        return Ok(see_other(LOGIN_PATH));
    };

    if form.validate() {
        match app
            .users
            .password_update(id, &form.current_password, &form.new_password)
            .await
        {
            Ok(()) => {
                session.insert(FLASH, "Your password has been updated!")?;
                return Ok(see_other("/account/view"));
            }
            Err(ModelError::InvalidCredentials) => form
                .validator
                .add_field_error("currentPassword", "Current password is incorrect"),
            Err(e) => return Err(e.into()),
        }
    }

    let data = template_data(&req, &session)?;
    Ok(render(StatusCode::UNPROCESSABLE_ENTITY, Page::PasswordUpdate(&form), &data))
}

// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Datelike, Utc};
use std::fmt::Write;

use crate::forms::{
    AccountPasswordUpdateForm, SnippetCreateForm, UserLoginForm, UserSignupForm, Validator,
};
use crate::models::{Snippet, User};

/// Values every page needs besides its own content.
#[derive(Debug, Clone, Default)]
pub struct TemplateData {
    pub current_year: i32,
    pub flash: Option<String>,
    pub is_authenticated: bool,
    pub csrf_token: String,
}

impl TemplateData {
    pub fn new(flash: Option<String>, is_authenticated: bool, csrf_token: String) -> Self {
        Self {
            current_year: Utc::now().year(),
            flash,
            is_authenticated,
            csrf_token,
        }
    }
}

pub enum Page<'a> {
    Home(&'a [Snippet]),
    View(&'a Snippet),
    Create(&'a SnippetCreateForm),
    Signup(&'a UserSignupForm),
    Login(&'a UserLoginForm),
    About,
    Account(&'a User),
    PasswordUpdate(&'a AccountPasswordUpdateForm),
}

impl Page<'_> {
    fn title(&self) -> &'static str {
        match self {
            Page::Home(_) => "Home",
            Page::View(_) => "Snippet",
            Page::Create(_) => "Create a New Snippet",
            Page::Signup(_) => "Signup",
            Page::Login(_) => "Login",
            Page::About => "About",
            Page::Account(_) => "Your Account",
            Page::PasswordUpdate(_) => "Change Password",
        }
    }
}

/// Formats as `17 Mar 2024 at 10:15`.
pub fn human_date(t: &DateTime<Utc>) -> String {
    t.format("%d %b %Y at %H:%M").to_string()
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn csrf_field(token: &str) -> String {
    format!("<input type='hidden' name='csrf_token' value='{}'>\n", escape(token))
}

fn field_error(out: &mut String, v: &Validator, key: &str) {
    if let Some(msg) = v.field_error(key) {
        let _ = writeln!(out, "<label class='error'>{}</label>", escape(msg));
    }
}

fn non_field_errors(out: &mut String, v: &Validator) {
    for msg in &v.non_field_errors {
        let _ = writeln!(out, "<div class='error'>{}</div>", escape(msg));
    }
}

pub fn render(page: &Page<'_>, data: &TemplateData) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<!doctype html>\n<html lang='en'>\n<head>\n<meta charset='utf-8'>\n\
         <title>{} - Snippetbox</title>\n\
         <link rel='stylesheet' href='/static/css/main.css'>\n\
         <link rel='shortcut icon' href='/static/img/favicon.ico' type='image/x-icon'>\n\
         </head>\n<body>\n<header><h1><a href='/'>Snippetbox</a></h1></header>\n",
        page.title()
    );
    nav(&mut out, data);
    out.push_str("<main>\n");
    if let Some(flash) = &data.flash {
        let _ = writeln!(out, "<div class='flash'>{}</div>", escape(flash));
    }
    body(&mut out, page, data);
    let _ = write!(
        out,
        "</main>\n<footer>Powered by <a href='https://actix.rs/'>actix-web</a> in {}</footer>\n\
         <script src='/static/js/main.js' type='text/javascript'></script>\n</body>\n</html>\n",
        data.current_year
    );
    out
}

fn nav(out: &mut String, data: &TemplateData) {
    out.push_str("<nav>\n<div>\n<a href='/'>Home</a>\n<a href='/about'>About</a>\n");
    if data.is_authenticated {
        out.push_str("<a href='/snippet/create'>Create snippet</a>\n");
    }
    out.push_str("</div>\n<div>\n");
    if data.is_authenticated {
        out.push_str("<a href='/account/view'>Account</a>\n");
        out.push_str("<form action='/user/logout' method='POST'>\n");
        out.push_str(&csrf_field(&data.csrf_token));
        out.push_str("<button>Logout</button>\n</form>\n");
    } else {
        out.push_str("<a href='/user/signup'>Signup</a>\n<a href='/user/login'>Login</a>\n");
    }
    out.push_str("</div>\n</nav>\n");
}

fn body(out: &mut String, page: &Page<'_>, data: &TemplateData) {
    match page {
        Page::Home(snippets) => home(out, snippets),
        Page::View(snippet) => view(out, snippet),
        Page::Create(form) => create(out, form, data),
        Page::Signup(form) => signup(out, form, data),
        Page::Login(form) => login(out, form, data),
        Page::About => {
            out.push_str("<h2>About</h2>\n<p>Snippetbox lets you paste and share short snippets of text.</p>\n")
        }
        Page::Account(user) => account(out, user),
        Page::PasswordUpdate(form) => password_update(out, form, data),
    }
}

fn home(out: &mut String, snippets: &[Snippet]) {
    out.push_str("<h2>Latest Snippets</h2>\n");
    if snippets.is_empty() {
        out.push_str("<p>There's nothing to see here... yet!</p>\n");
        return;
    }
    out.push_str("<table>\n<tr><th>Title</th><th>Created</th><th>ID</th></tr>\n");
    for s in snippets {
        let _ = writeln!(
            out,
            "<tr><td><a href='/snippet/view/{id}'>{title}</a></td><td>{created}</td><td>#{id}</td></tr>",
            id = s.id,
            title = escape(&s.title),
            created = human_date(&s.created)
        );
    }
    out.push_str("</table>\n");
}

fn view(out: &mut String, s: &Snippet) {
    let _ = write!(
        out,
        "<div class='snippet'>\n<div class='metadata'><strong>{title}</strong><span>#{id}</span></div>\n\
         <pre><code>{content}</code></pre>\n\
         <div class='metadata'><time>Created: {created}</time><time>Expires: {expires}</time></div>\n</div>\n",
        title = escape(&s.title),
        id = s.id,
        content = escape(&s.content),
        created = human_date(&s.created),
        expires = human_date(&s.expires)
    );
}

fn create(out: &mut String, form: &SnippetCreateForm, data: &TemplateData) {
    out.push_str("<form action='/snippet/create' method='POST'>\n");
    out.push_str(&csrf_field(&data.csrf_token));
    out.push_str("<div>\n<label>Title:</label>\n");
    field_error(out, &form.validator, "title");
    let _ = writeln!(out, "<input type='text' name='title' value='{}'>\n</div>", escape(&form.title));
    out.push_str("<div>\n<label>Content:</label>\n");
    field_error(out, &form.validator, "content");
    let _ = writeln!(out, "<textarea name='content'>{}</textarea>\n</div>", escape(&form.content));
    out.push_str("<div>\n<label>Delete in:</label>\n");
    field_error(out, &form.validator, "expires");
    for (days, label) in [(365, "One Year"), (7, "One Week"), (1, "One Day")] {
        let checked = if form.expires == days { " checked" } else { "" };
        let _ = writeln!(out, "<input type='radio' name='expires' value='{days}'{checked}> {label}");
    }
    out.push_str("</div>\n<div>\n<input type='submit' value='Publish snippet'>\n</div>\n</form>\n");
}

fn signup(out: &mut String, form: &UserSignupForm, data: &TemplateData) {
    out.push_str("<form action='/user/signup' method='POST' novalidate>\n");
    out.push_str(&csrf_field(&data.csrf_token));
    out.push_str("<div>\n<label>Name:</label>\n");
    field_error(out, &form.validator, "name");
    let _ = writeln!(out, "<input type='text' name='name' value='{}'>\n</div>", escape(&form.name));
    out.push_str("<div>\n<label>Email:</label>\n");
    field_error(out, &form.validator, "email");
    let _ = writeln!(out, "<input type='email' name='email' value='{}'>\n</div>", escape(&form.email));
    out.push_str("<div>\n<label>Password:</label>\n");
    field_error(out, &form.validator, "password");
    out.push_str("<input type='password' name='password'>\n</div>\n");
    out.push_str("<div>\n<input type='submit' value='Signup'>\n</div>\n</form>\n");
}

fn login(out: &mut String, form: &UserLoginForm, data: &TemplateData) {
    out.push_str("<form action='/user/login' method='POST' novalidate>\n");
    out.push_str(&csrf_field(&data.csrf_token));
    non_field_errors(out, &form.validator);
    out.push_str("<div>\n<label>Email:</label>\n");
    field_error(out, &form.validator, "email");
    let _ = writeln!(out, "<input type='email' name='email' value='{}'>\n</div>", escape(&form.email));
    out.push_str("<div>\n<label>Password:</label>\n");
    field_error(out, &form.validator, "password");
    out.push_str("<input type='password' name='password'>\n</div>\n");
    out.push_str("<div>\n<input type='submit' value='Login'>\n</div>\n</form>\n");
}

fn account(out: &mut String, user: &User) {
    let _ = write!(
        out,
        "<h2>Your Account</h2>\n<table>\n\
         <tr><th>Name</th><td>{name}</td></tr>\n\
         <tr><th>Email</th><td>{email}</td></tr>\n\
         <tr><th>Joined</th><td>{joined}</td></tr>\n\
         <tr><th>Password</th><td><a href='/account/password/update'>Change password</a></td></tr>\n\
         </table>\n",
        name = escape(&user.name),
        email = escape(&user.email),
        joined = human_date(&user.created)
    );
}

fn password_update(out: &mut String, form: &AccountPasswordUpdateForm, data: &TemplateData) {
    out.push_str("<h2>Change Password</h2>\n");
    out.push_str("<form action='/account/password/update' method='POST' novalidate>\n");
    out.push_str(&csrf_field(&data.csrf_token));
    for (name, label) in [
        ("currentPassword", "Current password:"),
        ("newPassword", "New password:"),
        ("newPasswordConfirmation", "Confirm new password:"),
    ] {
        let _ = writeln!(out, "<div>\n<label>{label}</label>");
        field_error(out, &form.validator, name);
        let _ = writeln!(out, "<input type='password' name='{name}'>\n</div>");
    }
    out.push_str("<div>\n<input type='submit' value='Change password'>\n</div>\n</form>\n");
}

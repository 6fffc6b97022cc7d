// SPDX-License-Identifier: Apache-2.0
mod common;

use actix_web::http::{header, Method, StatusCode};
use actix_web::test;

use snippetbox::app;

#[actix_web::test]
async fn ping_responds_without_a_session() {
    let app = test::init_service(app::build(common::application().await)).await;

    let req = test::TestRequest::get().uri("/ping").to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get(header::SET_COOKIE).is_none());
    let body = test::read_body(res).await;
    assert_eq!(body, "OK");
}

#[actix_web::test]
async fn snippet_view_parses_ids() {
    let app = test::init_service(app::build(common::application().await)).await;

    let cases = [
        ("/snippet/view/1", StatusCode::OK, Some("An old silent pond...")),
        ("/snippet/view/2", StatusCode::NOT_FOUND, None),
        ("/snippet/view/-1", StatusCode::NOT_FOUND, None),
        ("/snippet/view/0", StatusCode::NOT_FOUND, None),
        ("/snippet/view/1.23", StatusCode::NOT_FOUND, None),
        ("/snippet/view/foo", StatusCode::NOT_FOUND, None),
        ("/snippet/view/", StatusCode::NOT_FOUND, None),
    ];

    for (uri, status, contains) in cases {
        let req = test::TestRequest::get().uri(uri).to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), status, "GET {}", uri);

        let body = test::read_body(res).await;
        if let Some(expected) = contains {
            let body = String::from_utf8_lossy(&body);
            assert!(body.contains(expected), "GET {} body: {}", uri, body);
        }
    }
}

#[actix_web::test]
async fn unknown_paths_and_methods_are_not_found() {
    let app = test::init_service(app::build(common::application().await)).await;

    let cases = [
        (Method::GET, "/missing"),
        (Method::GET, "/snippet"),
        (Method::DELETE, "/"),
        (Method::PUT, "/about"),
        (Method::POST, "/ping"),
    ];

    for (method, uri) in cases {
        let req = test::TestRequest::default()
            .method(method.clone())
            .uri(uri)
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{} {}", method, uri);
    }
}

#[actix_web::test]
async fn root_matches_only_itself() {
    let app = test::init_service(app::build(common::application().await)).await;

    let req = test::TestRequest::get().uri("/").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = test::read_body(res).await;
    assert!(String::from_utf8_lossy(&body).contains("An old silent pond"));

    let req = test::TestRequest::get().uri("/nothing/here").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn every_response_carries_the_security_headers() {
    let app = test::init_service(app::build(common::application().await)).await;

    for uri in ["/ping", "/", "/missing"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let res = test::call_service(&app, req).await;
        let headers = res.headers();

        assert_eq!(
            headers.get("Content-Security-Policy").unwrap(),
            "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com",
            "{}",
            uri
        );
        assert_eq!(headers.get("Referrer-Policy").unwrap(), "origin-when-cross-origin");
        assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
        assert_eq!(headers.get("X-Frame-Options").unwrap(), "deny");
        assert_eq!(headers.get("X-XSS-Protection").unwrap(), "0");
        assert_eq!(headers.get(header::SERVER).unwrap(), "snippetbox");
    }
}

#[actix_web::test]
async fn static_files_are_served() {
    let app = test::init_service(app::build(common::application().await)).await;

    let req = test::TestRequest::get().uri("/static/css/main.css").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/static/css/nope.css").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn protected_routes_redirect_to_login() {
    let app = test::init_service(app::build(common::application().await)).await;

    for uri in ["/snippet/create", "/account/view", "/account/password/update"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/user/login");
        assert_eq!(res.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
    }
}

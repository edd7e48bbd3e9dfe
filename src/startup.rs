use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::AuthContext;
use crate::configuration::Settings;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    forgot_password, health_check, login, logout, me, refresh, reset_password, revoke_sessions,
};
use crate::security::{RateLimiterManager, SecurityHeaders};

pub fn run(
    listener: TcpListener,
    context: AuthContext,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    let jwt_config = context.jwt.clone();
    let context = web::Data::new(context);
    let limiter = web::Data::new(RateLimiterManager::new(&settings.rate_limit));
    let json_limit = settings.rate_limit.max_content_length as usize;

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(SecurityHeaders::middleware())
            .wrap(Logger::new("%a \"%r\" %s %T").exclude("/health_check"))
            .wrap(LoggerMiddleware)
            // Shared state
            .app_data(context.clone())
            .app_data(limiter.clone())
            .app_data(web::JsonConfig::default().limit(json_limit))
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/forgot-password", web::post().to(forgot_password))
            .route("/auth/reset-password", web::post().to(reset_password))
            // Bearer-protected routes
            .service(
                web::scope("/auth")
                    .wrap(JwtMiddleware::new(jwt_config.clone()))
                    .route("/logout", web::post().to(logout))
                    .route("/me", web::get().to(me)),
            )
            .service(
                web::scope("/admin")
                    .wrap(JwtMiddleware::new(jwt_config.clone()))
                    .route(
                        "/principals/{id}/revoke-sessions",
                        web::post().to(revoke_sessions),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

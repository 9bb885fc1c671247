use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::CredentialService;
use crate::configuration::CookieSettings;
use crate::middleware::{DeviceIdMiddleware, JwtMiddleware};
use crate::routes::{
    change_password, get_device, health_check, last_used_device, list_devices, login, logout,
    refresh, register, revoke_device, revoke_other_devices, validate,
};

pub fn run(
    listener: TcpListener,
    service: CredentialService,
    cookies: CookieSettings,
) -> Result<Server, std::io::Error> {
    let service = web::Data::new(service);
    let cookie_settings = web::Data::new(cookies.clone());

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(DeviceIdMiddleware::new(cookies.clone()))
            .wrap(Logger::default())

            // Shared state
            .app_data(service.clone())
            .app_data(cookie_settings.clone())

            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout))
                    // Protected routes (require JWT authentication)
                    .service(
                        web::resource("/validate")
                            .wrap(JwtMiddleware)
                            .route(web::get().to(validate)),
                    )
                    .service(
                        web::resource("/password")
                            .wrap(JwtMiddleware)
                            .route(web::post().to(change_password)),
                    ),
            )
            .service(
                web::scope("/devices")
                    .wrap(JwtMiddleware)
                    .route("", web::get().to(list_devices))
                    .route("", web::delete().to(revoke_other_devices))
                    .route("/last", web::get().to(last_used_device))
                    .route("/{id}", web::get().to(get_device))
                    .route("/{id}", web::delete().to(revoke_device)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

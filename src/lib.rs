pub mod auth;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod schema;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use auth::TokenSecret;
pub use db::{create_pool, DbPool};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) {
    let mut conn = pool.get().expect("Failed to get DB connection for migrations");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Failed to run database migrations");
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::cart::get_cart,
        handlers::cart::add_line,
        handlers::cart::set_quantity,
        handlers::cart::remove_line,
        handlers::cart::merge,
        handlers::cart::clear,
        handlers::orders::create_order,
        handlers::orders::list_user_orders,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::update_status,
        handlers::products::list_products,
        handlers::products::list_categories,
        handlers::products::get_product,
        handlers::products::create_product,
        handlers::products::update_product,
        handlers::products::delete_product,
        handlers::banners::active_banner,
        handlers::banners::list_banners,
        handlers::banners::create_banner,
        handlers::banners::update_banner,
        handlers::banners::delete_banner,
    ),
    tags(
        (name = "cart", description = "Guest and user carts"),
        (name = "orders", description = "Checkout and order management"),
        (name = "products", description = "Product catalog"),
        (name = "banners", description = "Promotional banners"),
    )
)]
struct ApiDoc;

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    pool: DbPool,
    secret: TokenSecret,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    Ok(HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(secret.clone()))
            .wrap(Logger::default())
            .service(
                web::scope("/api")
                    .service(
                        web::scope("/cart")
                            .route("", web::get().to(handlers::cart::get_cart))
                            .route("", web::post().to(handlers::cart::add_line))
                            .route("/merge", web::post().to(handlers::cart::merge))
                            .route("/clear", web::post().to(handlers::cart::clear))
                            .route("/{product_id}", web::put().to(handlers::cart::set_quantity))
                            .route(
                                "/{product_id}",
                                web::delete().to(handlers::cart::remove_line),
                            ),
                    )
                    .service(
                        web::scope("/orders")
                            .route("", web::post().to(handlers::orders::create_order))
                            .route("", web::get().to(handlers::orders::list_orders))
                            .route(
                                "/user/{user_id}",
                                web::get().to(handlers::orders::list_user_orders),
                            )
                            .route("/{id}/status", web::put().to(handlers::orders::update_status))
                            .route("/{id}", web::get().to(handlers::orders::get_order)),
                    )
                    .service(
                        web::scope("/products")
                            .route("", web::get().to(handlers::products::list_products))
                            .route("", web::post().to(handlers::products::create_product))
                            .route(
                                "/categories",
                                web::get().to(handlers::products::list_categories),
                            )
                            .route("/{id}", web::get().to(handlers::products::get_product))
                            .route("/{id}", web::put().to(handlers::products::update_product))
                            .route(
                                "/{id}",
                                web::delete().to(handlers::products::delete_product),
                            ),
                    )
                    .service(
                        web::scope("/banners")
                            .route("/active", web::get().to(handlers::banners::active_banner))
                            .route("", web::get().to(handlers::banners::list_banners))
                            .route("", web::post().to(handlers::banners::create_banner))
                            .route("/{id}", web::put().to(handlers::banners::update_banner))
                            .route("/{id}", web::delete().to(handlers::banners::delete_banner)),
                    ),
            )
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
    .bind((host.to_string(), port))?
    .run())
}

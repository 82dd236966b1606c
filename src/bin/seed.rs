//! Loads the demo catalog and an admin user, then prints a development
//! bearer token for the admin.
//!
//!   DATABASE_URL=postgres://.. APP_TOKEN_SECRET=.. cargo run --bin seed

use std::env;
use std::str::FromStr as _;

use bigdecimal::BigDecimal;
use chrono::Duration;
use diesel::prelude::*;
use dotenvy::dotenv;
use uuid::Uuid;

use storefront_service::auth::issue_token;
use storefront_service::infrastructure::models::{NewProductRow, NewUserRow};
use storefront_service::schema::{products, users};
use storefront_service::{create_pool, run_migrations, TokenSecret};

const ADMIN_EMAIL: &str = "admin@storefront.local";

const DEMO_PRODUCTS: &[(&str, &str, &str, &str, &str, i32)] = &[
    (
        "Laptop",
        "High-performance laptop with 16GB RAM",
        "999.90",
        "/images/laptop.jpeg",
        "Electronics",
        10,
    ),
    (
        "Smartphone",
        "Latest smartphone with 5G support",
        "499.99",
        "/images/smartphone.jpeg",
        "Electronics",
        20,
    ),
    (
        "Mouse",
        "Light and good-looking mouse with cable",
        "100.00",
        "/images/mouse.jpeg",
        "Electronics",
        10,
    ),
    (
        "Smart Tv",
        "Latest smart tv with internet support",
        "300.55",
        "/images/tv.jpeg",
        "Electronics",
        20,
    ),
    (
        "Remote",
        "Smart and light remote",
        "499.99",
        "/images/remote.jpeg",
        "Electronics",
        20,
    ),
    (
        "Camera",
        "Latest camera with modern light support",
        "120.22",
        "/images/camera.jpeg",
        "Electronics",
        20,
    ),
    (
        "Computer",
        "Latest computer with 5G support",
        "400.44",
        "/images/computer.jpeg",
        "Electronics",
        30,
    ),
    (
        "Headphones",
        "Wireless headphones with noise cancellation",
        "79.99",
        "/images/headphone.jpeg",
        "Accessories",
        15,
    ),
];

fn main() {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let token_secret = env::var("APP_TOKEN_SECRET").expect("APP_TOKEN_SECRET must be set");

    let pool = create_pool(&database_url);
    run_migrations(&pool);
    let mut conn = pool.get().expect("Failed to get DB connection");

    // The demo catalog is reloaded from scratch on every run.
    diesel::delete(products::table)
        .execute(&mut conn)
        .expect("Failed to clear products");
    let rows: Vec<NewProductRow> = DEMO_PRODUCTS
        .iter()
        .map(|(name, description, price, image, category, stock)| NewProductRow {
            id: Uuid::new_v4(),
            name: (*name).to_string(),
            description: (*description).to_string(),
            price: BigDecimal::from_str(price).expect("valid demo price"),
            image: (*image).to_string(),
            category: (*category).to_string(),
            stock: *stock,
        })
        .collect();
    diesel::insert_into(products::table)
        .values(&rows)
        .execute(&mut conn)
        .expect("Failed to seed products");
    log::info!("Seeded {} products", rows.len());

    // The admin survives reseeding; only created if missing.
    diesel::insert_into(users::table)
        .values(&NewUserRow {
            id: Uuid::new_v4(),
            name: "Admin".to_string(),
            email: ADMIN_EMAIL.to_string(),
            role: "admin".to_string(),
        })
        .on_conflict(users::email)
        .do_nothing()
        .execute(&mut conn)
        .expect("Failed to seed admin user");
    let admin_id: Uuid = users::table
        .filter(users::email.eq(ADMIN_EMAIL))
        .select(users::id)
        .first(&mut conn)
        .expect("admin user should exist");

    let token = issue_token(&TokenSecret::new(token_secret), admin_id, Duration::days(30));
    log::info!("Admin user: {ADMIN_EMAIL} ({admin_id})");
    println!("{token}");
}

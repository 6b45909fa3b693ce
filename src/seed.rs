use tracing::info;

use crate::error::StoreError;
use crate::listing::Status;
use crate::products::repo_types::NewProduct;
use crate::state::AppState;
use crate::users::services::prepare_new_user;

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_EMAIL: &str = "admin@example.com";

/// Creates the admin account and demo catalogue when configured. Safe to run on every start.
pub async fn run(state: &AppState) -> anyhow::Result<()> {
    if let Some(password) = state.config.seed.admin_password.as_deref() {
        seed_admin(state, password).await?;
    }
    if state.config.seed.demo_products {
        seed_products(state).await?;
    }
    Ok(())
}

async fn seed_admin(state: &AppState, password: &str) -> anyhow::Result<()> {
    if state.users.find_by_username(ADMIN_USERNAME).await?.is_some() {
        return Ok(());
    }
    let admin = prepare_new_user(ADMIN_USERNAME, ADMIN_EMAIL, "Administrator", password)?;
    match state.users.create(admin).await {
        Ok(user) => info!(user_id = user.id, "admin user seeded"),
        Err(StoreError::Conflict { .. }) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn seed_products(state: &AppState) -> anyhow::Result<()> {
    if state.products.count().await? > 0 {
        return Ok(());
    }
    let demo = [
        NewProduct {
            name: "Laptop".into(),
            description: "High-performance laptop".into(),
            price: 5999.0,
            category: "electronics".into(),
            stock: 50,
            status: Status::Active,
        },
        NewProduct {
            name: "Wireless Mouse".into(),
            description: "Bluetooth wireless mouse".into(),
            price: 99.0,
            category: "electronics".into(),
            stock: 200,
            status: Status::Active,
        },
    ];
    for product in demo {
        state.products.create(product).await?;
    }
    info!("demo products seeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::state::test_config;

    #[tokio::test]
    async fn seeds_once_and_only_when_configured() {
        let mut config = test_config();
        config.seed.admin_password = Some("admin-password".into());
        config.seed.demo_products = true;
        let state = AppState::in_memory(config);

        run(&state).await.unwrap();
        run(&state).await.unwrap();

        let admin = state.users.find_by_username(ADMIN_USERNAME).await.unwrap().unwrap();
        assert_eq!(admin.email, ADMIN_EMAIL);
        assert!(verify_password("admin-password", &admin.password_hash).unwrap());
        assert_eq!(state.products.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn nothing_seeded_by_default() {
        let state = AppState::fake();
        run(&state).await.unwrap();
        assert!(state.users.find_by_username(ADMIN_USERNAME).await.unwrap().is_none());
        assert_eq!(state.products.count().await.unwrap(), 0);
    }
}

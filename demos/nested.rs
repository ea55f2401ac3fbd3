use sqlx_resilient::{params, with_transaction, Error, ExecutorConfig, MySqlDriver, ResilientExecutor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Connect to database
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "mysql://localhost/test".to_string());
    let config = ExecutorConfig::default().with_emulate_nested_transactions(true);
    let driver = MySqlDriver::connect(&database_url, &config).await?;
    let mut executor = ResilientExecutor::new(driver, config);

    println!("=== Nested Transaction (Savepoint) Example ===\n");

    // Example 1: Successful nested transaction
    println!("1. Nested transaction - both succeed...");
    with_transaction(&mut executor, |tx| {
        Box::pin(async move {
            tx.perform(
                "INSERT INTO users (name, email) VALUES (:name, :email)",
                &params! { "name" => "David", "email" => "david@example.com" },
            )
            .await?;
            let user_id = tx.last_insert_id()?;
            let user_key = i64::try_from(user_id).map_err(|_| Error::InvalidInsertId(user_id.to_string()))?;
            println!("   Outer: Created user with ID {}", user_id);

            with_transaction(tx, |nested_tx| {
                Box::pin(async move {
                    nested_tx
                        .perform(
                            "INSERT INTO audit_log (user_id, action) VALUES (:user_id, :action)",
                            &params! { "user_id" => user_key, "action" => "User created" },
                        )
                        .await?;
                    println!("   Nested: Created audit log at depth {}", nested_tx.transaction_depth());
                    Ok::<_, Error>(())
                })
            })
            .await?;

            println!("   ✓ Both levels committed\n");
            Ok::<_, Error>(())
        })
    })
    .await?;

    // Example 2: Nested transaction fails, outer succeeds
    println!("2. Nested transaction fails, outer succeeds...");
    with_transaction(&mut executor, |tx| {
        Box::pin(async move {
            tx.perform(
                "INSERT INTO users (name, email) VALUES (:name, :email)",
                &params! { "name" => "Eve", "email" => "eve@example.com" },
            )
            .await?;
            let user_id = tx.last_insert_id()?;
            let user_key = i64::try_from(user_id).map_err(|_| Error::InvalidInsertId(user_id.to_string()))?;
            println!("   Outer: Created user with ID {}", user_id);

            let nested_result = with_transaction(tx, |nested_tx| {
                Box::pin(async move {
                    // This will fail
                    nested_tx
                        .perform(
                            "INSERT INTO non_existent_table VALUES (:user_id)",
                            &params! { "user_id" => user_key },
                        )
                        .await?;
                    Ok::<_, Error>(())
                })
            })
            .await;

            match nested_result {
                Ok(_) => println!("   ✗ Nested should have failed!"),
                Err(e) => println!("   Nested: Failed ({:?}: {})", e.kind(), e),
            }
            if let Some(query) = tx.last_executed_query() {
                println!("   Last query: {}", query);
            }

            println!("   Outer: Continuing despite nested failure...");
            println!("   ✓ Outer transaction committed (user created)\n");
            Ok::<_, Error>(())
        })
    })
    .await?;

    // Example 3: Starting a native transaction twice
    println!("3. Conflicting transaction start...");
    let mut strict = ResilientExecutor::new(
        MySqlDriver::connect(&database_url, &ExecutorConfig::default()).await?,
        ExecutorConfig::default(),
    );
    strict.begin_transaction().await?;
    match strict.begin_transaction().await {
        Err(Error::Classified(err)) => {
            let site = err
                .previous_transaction()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown".to_string());
            println!("   {} (open transaction started at {})\n", err, site);
        }
        other => println!("   ✗ Expected a conflict, got {:?}\n", other),
    }
    strict.rollback().await?;

    println!("=== All nested transaction examples completed ===");

    Ok(())
}

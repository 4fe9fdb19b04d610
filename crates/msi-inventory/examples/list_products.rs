//! List installed products, or describe a query against an installer database.
//!
//! ```text
//! cargo run --example list_products
//! cargo run --example list_products -- path\to\package.msi "SELECT * FROM Property"
//! ```

use tracing_subscriber::EnvFilter;

#[cfg(windows)]
fn run() -> msi_inventory::Result<()> {
    use std::sync::Arc;

    use msi_inventory::{Inventory, InventoryContext, MsiDatabaseDescriber, WindowsInstaller};

    let mut args = std::env::args().skip(1);
    let mut builder = InventoryContext::builder();
    let database = args.next();
    if let Some(path) = &database {
        builder = builder.describer(Arc::new(MsiDatabaseDescriber::new(path)));
    }
    let context = builder.build()?;

    if database.is_some() {
        let query = args.next().unwrap_or_else(|| "SELECT * FROM Property".to_string());
        let metadata = context.metadata()?;
        let columns = metadata.get_columns(&query)?;
        let display = metadata.get_display_member_set(&query)?;
        println!("{} columns:", columns.len());
        for column in columns.columns() {
            let shown = if display.contains(&column.name) { "" } else { " (hidden)" };
            println!("  {:>2} {} {}{}", column.ordinal, column.name, column.column_type, shown);
        }
        return Ok(());
    }

    let inventory = Inventory::new(Arc::new(WindowsInstaller::new()), context);
    println!("Using {:?} property API", inventory.api());

    for product in inventory.products() {
        let mut product = match product {
            Ok(product) => product,
            Err(e) => {
                eprintln!("Enumeration stopped: {}", e);
                break;
            }
        };
        match (product.product_name(), product.version()) {
            (Ok(name), Ok(version)) => {
                let version = version.map(|v| v.to_string()).unwrap_or_default();
                println!("  {} {} {}", product.product_code(), name, version);
            }
            (Err(e), _) | (_, Err(e)) => {
                println!("  {} <{}>", product.product_code(), e);
            }
        }
    }

    Ok(())
}

#[cfg(not(windows))]
fn run() -> msi_inventory::Result<()> {
    println!("No native installer on this platform.");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

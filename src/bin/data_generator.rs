use cube_rollups::config::PipelineConfig;
use rand::Rng;
use std::fs::{self, File};
use std::io::{BufWriter, Write};

const REGIONS: [&str; 6] = ["North", "South", "East", "West", "Central", "South-West"];
const PAYMENT_TYPES: [&str; 4] = ["Credit", "Debit", "Cash", "PayPal"];
const PRODUCTS: [(i64, &str, &str); 8] = [
    (101, "Laptop", "Electronics"),
    (102, "Hoodie", "Clothing"),
    (103, "Cable", "Electronics"),
    (104, "Hat", "Clothing"),
    (105, "Football", "Sports"),
    (106, "Controller", "Electronics"),
    (107, "Jacket", "Clothing"),
    (108, "Protector", "Sports"),
];
const NAMES: [&str; 10] = [
    "William White",
    "Wylie Coyote",
    "Dan Brown",
    "Chewie Chewbacca",
    "Dr Who",
    "Hermione Grager",
    "Hermione Granger",
    "Tiffany James",
    "Tom Thumb",
    "Bugs Bunny",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rows: usize = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 10_000,
    };

    let config = PipelineConfig::default();
    fs::create_dir_all(&config.cube_dir)?;
    let file = File::create(&config.cube_file)?;
    let mut writer = BufWriter::new(file);

    writeln!(
        writer,
        "customer_id,name,region,category,product_id,product_name,paymnt_type,sale_amount_sum"
    )?;

    let mut rng = rand::rng();
    for _ in 0..rows {
        let customer = rng.random_range(0..NAMES.len());
        // a customer mostly buys in one region
        let region = if rng.random_bool(0.8) {
            REGIONS[customer % REGIONS.len()]
        } else {
            REGIONS[rng.random_range(0..REGIONS.len())]
        };
        let (product_id, product_name, category) = PRODUCTS[rng.random_range(0..PRODUCTS.len())];
        let payment = PAYMENT_TYPES[rng.random_range(0..PAYMENT_TYPES.len())];
        let amount: f64 = rng.random_range(5.0..2500.0);

        writeln!(
            writer,
            "{},{},{},{},{},{},{},{:.2}",
            1001 + customer,
            NAMES[customer],
            region,
            category,
            product_id,
            product_name,
            payment,
            amount
        )?;
    }
    writer.flush()?;

    println!("Sample cube generated: {}", config.cube_file.display());
    Ok(())
}

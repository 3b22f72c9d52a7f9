// UniID - command line entry point
// Thin shell over the library: every command opens the store, runs one
// operation, prints the result

use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

use uniid::{
    attendance::AttendanceFilter, insert_students, list_attendance, list_policies,
    list_students, list_transactions, load_students_csv, open_database, process_tap,
    reset_demo_data, seed_demo_data, setup_database,
};

fn db_path() -> PathBuf {
    env::var("UNIID_DB")
        .unwrap_or_else(|_| "uniid.db".to_string())
        .into()
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init(),
        Some("import") => run_import(args.get(2).map(String::as_str)),
        Some("tap") => run_tap(&args[2..]),
        Some("students") => run_students(),
        Some("transactions") => run_transactions(),
        Some("policies") => run_policies(),
        Some("attendance") => run_attendance(),
        Some("reset-demo") => run_reset_demo(),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("UniID - Smart Campus Identity & Access System v{}", uniid::VERSION);
    println!();
    println!("Usage: uniid <command>");
    println!();
    println!("Commands:");
    println!("  init                          Create schema and seed demo data");
    println!("  import <roster.csv>           Enroll students from a CSV roster");
    println!("  tap <rfid_uid> <service> [context]");
    println!("                                Process a card tap");
    println!("  students                      List enrolled students");
    println!("  transactions                  Show the latest journal entries");
    println!("  policies                      Show service policies");
    println!("  attendance                    Show attendance records");
    println!("  reset-demo                    Restore demo balances, clear journal");
    println!();
    println!("Database path comes from UNIID_DB (default: uniid.db)");
}

fn run_init() -> Result<()> {
    println!("🔧 Initializing database...");

    let conn = open_database(&db_path())?;
    setup_database(&conn)?;
    println!("✓ Schema ready (WAL mode)");

    seed_demo_data(&conn)?;
    println!("✓ Demo data seeded");

    Ok(())
}

fn run_import(csv_arg: Option<&str>) -> Result<()> {
    let csv_path = match csv_arg {
        Some(path) => path,
        None => {
            eprintln!("Usage: uniid import <roster.csv>");
            std::process::exit(1);
        }
    };

    println!("📂 Loading roster from {}...", csv_path);
    let rows = load_students_csv(Path::new(csv_path))?;
    println!("✓ Parsed {} roster rows", rows.len());

    let conn = open_database(&db_path())?;
    setup_database(&conn)?;
    insert_students(&conn, &rows)?;

    Ok(())
}

fn run_tap(args: &[String]) -> Result<()> {
    let (rfid_uid, service) = match (args.first(), args.get(1)) {
        (Some(uid), Some(service)) => (uid.as_str(), service.as_str()),
        _ => {
            eprintln!("Usage: uniid tap <rfid_uid> <service> [context]");
            std::process::exit(1);
        }
    };
    let context = args.get(2).map(String::as_str);

    let mut conn = open_database(&db_path())?;

    let outcome = process_tap(&mut conn, rfid_uid, service, context)?;
    let response = outcome.to_response(service);

    let marker = if response.success { "✓" } else { "✗" };
    println!(
        "{} {} | {} | {}",
        marker, response.student, response.service, response.action
    );
    if let Some(amount) = response.amount_deducted {
        println!("  Deducted: {:.2}", amount);
    }
    println!("  Balance:  {:.2}", response.balance_remaining);

    Ok(())
}

fn run_students() -> Result<()> {
    let conn = open_database(&db_path())?;
    let students = list_students(&conn)?;

    println!("👥 {} students enrolled", students.len());
    for s in students {
        println!(
            "  {:<20} {:<10} {:<10} {:>8.2}  {}",
            s.name,
            s.roll_no,
            s.rfid_uid,
            s.wallet_balance,
            s.status.as_str()
        );
    }

    Ok(())
}

fn run_transactions() -> Result<()> {
    let conn = open_database(&db_path())?;
    let records = list_transactions(&conn, 100)?;

    println!("💾 {} journal entries (newest first)", records.len());
    for r in records {
        println!(
            "  {}  {:<20} {:<12} {:>8.2}",
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.student_name.as_deref().unwrap_or("-"),
            r.service_type,
            r.amount
        );
    }

    Ok(())
}

fn run_policies() -> Result<()> {
    let conn = open_database(&db_path())?;

    println!("🏷️  Service policies:");
    for p in list_policies(&conn) {
        let kind = if p.requires_payment { "paid" } else { "free" };
        println!("  {:<12} {:>8.2}  {}", p.service_type, p.cost, kind);
    }

    Ok(())
}

fn run_attendance() -> Result<()> {
    let conn = open_database(&db_path())?;
    let records = list_attendance(&conn, &AttendanceFilter::default())?;

    println!("📋 {} attendance records (newest first)", records.len());
    for r in records {
        println!(
            "  {}  {:<20} {}",
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.student_name.as_deref().unwrap_or("-"),
            r.service_context
        );
    }

    Ok(())
}

fn run_reset_demo() -> Result<()> {
    let conn = open_database(&db_path())?;
    reset_demo_data(&conn)?;

    println!("✓ Demo balances restored, journal cleared");

    Ok(())
}

use anyhow::{bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use voter_registry::entities::{user, voter};
use voter_registry::{
    dashboard_stats, default_db_path, open_database, BatchCoordinator, ImportPayload, LocalSink,
    VoterFilter,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init(),
        Some("seed-admin") => run_seed_admin(),
        Some("import") => run_import_cmd(&args[2..]),
        Some("export-voters") => run_export(&args[2..]),
        Some("purge-voters") => run_purge(),
        Some("fix-occupation") => run_fix_occupation(&args[2..]),
        Some("stats") => run_stats(),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("🗳️  Voter Registry v{}", voter_registry::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Usage: voter-registry <command>");
    println!();
    println!("Commands:");
    println!("  init                          Create the database schema");
    println!("  seed-admin                    Bootstrap the admin account");
    println!("  import <file.json> [out.json] Import a voter roll, optionally");
    println!("                                writing skipped records to out.json");
    println!("  export-voters <out.csv>       Export the active roll as CSV");
    println!("  purge-voters                  Hard-delete ALL voter rows");
    println!("  fix-occupation <from> <to>    Bulk-rename an occupation spelling");
    println!("  stats                         Print dashboard statistics");
    println!();
    println!("Database path comes from VOTER_DB_PATH (default: voters.db)");
}

fn db_path() -> PathBuf {
    PathBuf::from(default_db_path())
}

fn run_init() -> Result<()> {
    let path = db_path();
    let _conn = open_database(&path)?;
    println!("✓ Database initialized at {:?} (WAL mode)", path);
    Ok(())
}

fn run_seed_admin() -> Result<()> {
    let conn = open_database(&db_path())?;

    let password = "password123";
    let (admin, created) = user::seed_admin(&conn, password)?;

    if created {
        println!("✓ Admin user created");
        println!("  Username: {}", admin.username);
        println!("  Password: {}", password);
    } else {
        println!("✓ Admin user already exists, left untouched");
    }

    Ok(())
}

fn run_import_cmd(args: &[String]) -> Result<()> {
    let Some(file) = args.first() else {
        bail!("Usage: voter-registry import <file.json> [skipped-out.json]");
    };

    println!("📥 Importing voter roll");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load and resolve the payload shape once
    println!("\n📂 Loading {}...", file);
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file))?;
    let payload = ImportPayload::parse(&raw)?;

    let records = payload.into_flat_records();
    if records.is_empty() {
        bail!("Empty voter array provided.");
    }
    println!("✓ Loaded {} records", records.len());

    // 2. Open the store
    let conn = open_database(&db_path())?;

    // 3. Drive the chunks through the local sink
    println!("\n💾 Importing in chunks of {}...", voter_registry::CHUNK_SIZE);
    let coordinator = BatchCoordinator::new();
    let mut sink = LocalSink::new(&conn);

    let report = coordinator.run(&records, &mut sink, |processed, total| {
        println!("  → {}/{} processed", processed, total);
    });

    // 4. Totals
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Created: {} voters", report.created);
    println!("✓ Skipped: {} records", report.skipped);
    println!("✓ Areas created: {}", report.areas_created);
    if report.failed_chunks > 0 {
        println!("⚠️  Failed chunks: {}", report.failed_chunks);
    }

    // 5. Skipped-record export for operator review
    if !report.skipped_records.is_empty() {
        if let Some(out) = args.get(1) {
            let json = serde_json::to_string_pretty(&report.skipped_records)?;
            std::fs::write(out, json)
                .with_context(|| format!("Failed to write {}", out))?;
            println!("✓ Skipped records written to {}", out);
        } else {
            println!("  (pass an output file to export the skipped records)");
        }
    }

    Ok(())
}

fn run_export(args: &[String]) -> Result<()> {
    let Some(out) = args.first() else {
        bail!("Usage: voter-registry export-voters <out.csv>");
    };

    let conn = open_database(&db_path())?;

    println!("📤 Exporting active roll...");
    let count = voter::export_csv(&conn, Path::new(out))?;
    println!("✓ Wrote {} voters to {}", count, out);

    Ok(())
}

fn run_purge() -> Result<()> {
    let conn = open_database(&db_path())?;

    let before = voter::purge_all_voters(&conn)?;
    if before > 0 {
        println!("✓ Deleted {} voters", before);
    } else {
        println!("No voters found to delete.");
    }

    Ok(())
}

fn run_fix_occupation(args: &[String]) -> Result<()> {
    let (Some(from), Some(to)) = (args.first(), args.get(1)) else {
        bail!("Usage: voter-registry fix-occupation <from> <to>");
    };

    let conn = open_database(&db_path())?;

    let changed = voter::fix_occupation(&conn, from, to)?;
    if changed > 0 {
        println!("✓ Updated {} records: {:?} → {:?}", changed, from, to);
    } else {
        println!("No records with occupation {:?} found.", from);
    }

    Ok(())
}

fn run_stats() -> Result<()> {
    let conn = open_database(&db_path())?;
    let stats = dashboard_stats(&conn, &VoterFilter::default())?;

    println!("📊 Voter Registry Statistics");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Total voters:   {}", stats.total_voters);
    println!("Deleted voters: {}", stats.deleted_voters);
    println!("Voter areas:    {}", stats.total_areas);

    if !stats.occupation_stats.is_empty() {
        println!("\nTop occupations:");
        for stat in &stats.occupation_stats {
            println!("  {:<20} {}", stat.occupation, stat.count);
        }
    }

    if !stats.area_stats.is_empty() {
        println!("\nVoters by area:");
        for stat in &stats.area_stats {
            println!("  {:<20} {}", stat.area_code, stat.count);
        }
    }

    println!("\nAge distribution:");
    for bucket in &stats.age_stats {
        println!("  {:<8} {}", bucket.age_group, bucket.count);
    }

    Ok(())
}

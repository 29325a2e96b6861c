use std::path::Path;

use gp_joule_sync::adapters::db::{
    insert_configuration, list_configurations, open_connection, run_migrations, schema_version,
};
use gp_joule_sync::domain::filter::FilterRule;
use gp_joule_sync::domain::models::NewTenantConfig;

fn main() {
    if let Err(error) = run() {
        eprintln!("failed to seed tenant: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut path = "./data/gp_joule.db".to_string();
    let mut force = false;
    let mut tenant = NewTenantConfig {
        root_url: String::new(),
        api_key: String::new(),
        enable: true,
        refresh_interval_secs: 60,
        request_timeout_secs: 120,
        project_ids: Vec::new(),
        asset_filter: Vec::new(),
        user_id: None,
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut index = 0;
    while index < args.len() {
        let flag = args[index].as_str();
        match flag {
            "--force" => {
                force = true;
                index += 1;
            }
            "--disabled" => {
                tenant.enable = false;
                index += 1;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--path" | "--root-url" | "--api-key" | "--project" | "--interval" | "--timeout"
            | "--filter" | "--user" => {
                let Some(value) = args.get(index + 1) else {
                    return Err(format!("{flag} requires a value"));
                };
                apply_value(&mut tenant, &mut path, flag, value)?;
                index += 2;
            }
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
    }

    if tenant.root_url.is_empty() || tenant.api_key.is_empty() {
        return Err("--root-url and --api-key are required".to_string());
    }

    let path_ref = Path::new(&path);
    if let Some(parent) = path_ref.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|error| format!("failed to create parent directory: {error}"))?;
    }

    if force && path_ref.exists() {
        std::fs::remove_file(path_ref)
            .map_err(|error| format!("failed to remove existing db file: {error}"))?;
    }

    let mut connection = open_connection(&path).map_err(|error| error.to_string())?;
    run_migrations(&mut connection).map_err(|error| error.to_string())?;
    let version = schema_version(&connection).map_err(|error| error.to_string())?;
    let id = insert_configuration(&connection, &tenant).map_err(|error| error.to_string())?;
    let total = list_configurations(&connection)
        .map_err(|error| error.to_string())?
        .len();

    println!("seeded tenant {id} into: {path}");
    println!("schema version: {version}, tenants: {total}");
    Ok(())
}

fn apply_value(
    tenant: &mut NewTenantConfig,
    path: &mut String,
    flag: &str,
    value: &str,
) -> Result<(), String> {
    match flag {
        "--path" => *path = value.to_string(),
        "--root-url" => tenant.root_url = value.to_string(),
        "--api-key" => tenant.api_key = value.to_string(),
        "--project" => tenant.project_ids.push(value.to_string()),
        "--interval" => tenant.refresh_interval_secs = parse_secs(flag, value)?,
        "--timeout" => tenant.request_timeout_secs = parse_secs(flag, value)?,
        "--filter" => tenant.asset_filter.push(parse_filter_group(value)?),
        "--user" => tenant.user_id = Some(value.to_string()),
        _ => return Err(format!("unknown argument: {flag}")),
    }
    Ok(())
}

fn parse_secs(flag: &str, value: &str) -> Result<u64, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("{flag} must be a number of seconds"))
}

/// `status=^occupied$,plug_type=Type2` becomes one AND-ed group.
fn parse_filter_group(value: &str) -> Result<Vec<FilterRule>, String> {
    value
        .split(',')
        .map(|pair| {
            pair.split_once('=')
                .map(|(parameter, regex)| FilterRule::new(parameter.trim(), regex.trim()))
                .ok_or_else(|| format!("filter rule must be attribute=regex: {pair}"))
        })
        .collect()
}

fn print_help() {
    println!("seed_tenant");
    println!();
    println!("Usage:");
    println!(
        "  cargo run --bin seed_tenant -- --root-url <url> --api-key <key> [--project <id>]... [options]"
    );
    println!();
    println!("Options:");
    println!("  --path <file>          target sqlite file (default: ./data/gp_joule.db)");
    println!("  --project <id>         platform project to mirror into, repeatable");
    println!("  --interval <secs>      refresh interval (default: 60)");
    println!("  --timeout <secs>       provider request timeout, 0 uses 120 (default: 120)");
    println!("  --filter <rules>       attribute=regex pairs joined by ',', repeatable (OR)");
    println!("  --user <id>            platform user id stored with the tenant");
    println!("  --disabled             insert the tenant with enable=false");
    println!("  --force                delete existing file before creating");
}

//! Command-line front end for permit recovery and cell decryption.
//!
//! ```sh
//! s63-permit recover-user 220E95A0510854239A876DB34142
//! s63-permit recover-cell ENC_ROOT/PERMIT.TXT
//! s63-permit decrypt-cells --hw-id 123456789A PERMIT.TXT ENC_ROOT out/
//! s63-permit make-user --hw-id 123456789A --key 01234 --m-id 4142
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;

use s63_permit::{
    create_user_permit, decrypt_cell_tree, HardwareId, KeyFinder, ManufacturerId, MasterKey,
    PermitStore, Recovered, Result,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Worker threads for key searches (default: one per CPU).
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// More logging; repeat for debug output.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recover master key and hardware id from a user permit.
    RecoverUser {
        /// 28-character user permit.
        permit: String,
    },
    /// Recover the hardware id from the last cell permit of a permit list.
    RecoverCell { permit_file: PathBuf },
    /// Decrypt every cell file under a directory.
    DecryptCells {
        /// Candidate hardware id, 5 characters or 10 hex digits. Repeatable.
        #[arg(long = "hw-id", required = true)]
        hw_ids: Vec<HardwareId>,
        permit_file: PathBuf,
        cell_dir: PathBuf,
        out_dir: PathBuf,
    },
    /// Build a user permit.
    MakeUser {
        #[arg(long)]
        hw_id: HardwareId,
        #[arg(long)]
        key: MasterKey,
        /// Manufacturer id as 4 hex digits.
        #[arg(long, value_parser = parse_m_id)]
        m_id: ManufacturerId,
    },
}

fn parse_m_id(s: &str) -> std::result::Result<ManufacturerId, String> {
    let digits = s.trim_start_matches(['x', 'X']);
    u16::from_str_radix(digits, 16)
        .map(ManufacturerId)
        .map_err(|e| format!("invalid manufacturer id {:?}: {}", s, e))
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let finder = match args.workers {
        Some(n) => KeyFinder::with_workers(n),
        None => KeyFinder::new(),
    };

    match run(args.command, &finder) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when a search came back empty.
fn run(command: Command, finder: &KeyFinder) -> Result<bool> {
    match command {
        Command::RecoverUser { permit } => match finder.recover_user_permit(&permit)? {
            Recovered::Found(r) => {
                println!("key:          {} ({})", r.key.as_ascii().unwrap_or("?"), r.key);
                println!("hardware id:  {}", r.hardware_id);
                println!(
                    "manufacturer: x{} ({})",
                    r.manufacturer_id,
                    r.manufacturer_id.vendor_code()
                );
                Ok(true)
            }
            Recovered::NotFound => {
                eprintln!("no master key in the hex-digit space opens this permit");
                Ok(false)
            }
        },
        Command::RecoverCell { permit_file } => {
            match finder.recover_from_permit_list(&permit_file)? {
                Recovered::Found(m) => {
                    println!("hardware id:  {}", m.hardware_id);
                    println!("cell key 1:   {}", m.cell_keys.first);
                    println!("cell key 2:   {}", m.cell_keys.second);
                    Ok(true)
                }
                Recovered::NotFound => {
                    eprintln!("no hardware id in the hex-digit space opens this permit");
                    Ok(false)
                }
            }
        }
        Command::DecryptCells {
            hw_ids,
            permit_file,
            cell_dir,
            out_dir,
        } => {
            let store = PermitStore::load(&permit_file, &hw_ids)?;
            println!("hardware id:  {} ({} cells)", store.hardware_id(), store.len());
            let written = decrypt_cell_tree(&cell_dir, &store.into_cells(), &out_dir)?;
            for path in &written {
                println!("{}", path.display());
            }
            Ok(true)
        }
        Command::MakeUser { hw_id, key, m_id } => {
            println!("{}", create_user_permit(&hw_id, &key, m_id)?);
            Ok(true)
        }
    }
}

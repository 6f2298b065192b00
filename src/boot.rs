//! Demonstration boot sequence.
//!
//! Opens each store from an existing file, in a fixed order, and prints a
//! status line per phase:
//!
//! 1. parameters, a u64 array
//! 2. navigation database load, a string table (sampled)
//! 3. navigation database validation (every element)
//! 4. flight log, a block list: seek to the last entry
//! 5. flight log replay forward, then backward

use std::borrow::Cow;
use std::io::Write;

use tracing::{debug, info};

use crate::config::Config;
use crate::storage::{BlockList, DiskArray, StrTable};
use crate::{Error, Result};

/// Print every this-many parameters
const PARAM_STRIDE: u64 = 100;

/// Sample one navigation element in this many
const NAV_SAMPLE_STRIDE: u32 = 10;

/// Start a new line of validation dots this often
const VALIDATE_LINE: u32 = 32;

pub fn run<W: Write>(config: &Config, out: &mut W) -> Result<()> {
    io_wait(config, 0);
    io_wait(config, 1);
    load_params(config, out)?;
    io_wait(config, 2);
    load_db(config, out)?;
    io_wait(config, 3);
    validate_db(config, out)?;
    io_wait(config, 4);
    load_log(config, out)?;
    io_wait(config, 5);
    replay_log(config, out)?;
    io_wait(config, 6);
    info!("boot sequence complete");
    Ok(())
}

/// Mark an I/O wait point between phases; `-quiet` drops all of them and
/// `-skip` drops the first.
fn io_wait(config: &Config, step: u32) -> bool {
    let wait = !config.quiet() && !(config.skip_intro() && step == 0);
    if wait {
        debug!(step, "i/o wait");
    }
    wait
}

fn load_params<W: Write>(config: &Config, out: &mut W) -> Result<()> {
    let params = DiskArray::open(config.params_path(), 0, 0)?;
    if params.element_size() != size_of::<u64>() as u64 {
        return Err(Error::InvalidFormat(format!(
            "parameter array has {} byte elements, expected 8",
            params.element_size()
        )));
    }
    writeln!(
        out,
        "[    0.000000]   LOADING WEIGHTS/BIASES [{:p}]",
        params.region().base_addr()
    )?;

    for index in (0..params.len()).step_by(PARAM_STRIDE as usize) {
        if let Some(param) = params.read::<u64>(index) {
            writeln!(out, "[    0.000000]     param encoding {:x}", param)?;
        }
    }

    params.close()
}

/// Element length must be the string length plus its terminator.
fn checked_element(table: &StrTable, index: u32) -> Result<Cow<'_, str>> {
    let element = table.get(index);
    let len = table.element_len(index);
    match (element, len) {
        (Some(element), Some(len)) if element.to_bytes().len() + 1 == len as usize => {
            Ok(element.to_string_lossy())
        }
        _ => Err(Error::InvalidFormat(format!(
            "navigation element {} is malformed",
            index
        ))),
    }
}

fn load_db<W: Write>(config: &Config, out: &mut W) -> Result<()> {
    let nav = StrTable::open(config.db_path(), 0)?;
    writeln!(out, "[    0.059309] LOADING [{:p}]", nav.region().base_addr())?;

    for index in (0..nav.len()).step_by(NAV_SAMPLE_STRIDE as usize) {
        let element = checked_element(&nav, index)?;
        // only the part after the last ';' is shown
        let Some((_, suffix)) = element.rsplit_once(';') else {
            return Err(Error::InvalidFormat(format!(
                "navigation element {} has no ';' separator",
                index
            )));
        };
        writeln!(out, "[    0.059550]     NAV[{}] {}", index, suffix)?;
    }

    nav.close()
}

fn validate_db<W: Write>(config: &Config, out: &mut W) -> Result<()> {
    let nav = StrTable::open(config.db_path(), 0)?;
    write!(out, "[    0.620017] NAV: VALIDATING [{:p}]", nav.region().base_addr())?;

    for index in 0..nav.len() {
        if index % VALIDATE_LINE == 0 {
            write!(out, "\n[    0.620017]     NAV [{}]: ", index)?;
        }
        checked_element(&nav, index)?;
        write!(out, ".")?;
    }
    writeln!(out)?;

    nav.close()
}

/// Payloads are printed up to their first NUL, like C strings.
fn entry(payload: &[u8]) -> Cow<'_, str> {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end])
}

fn load_log<W: Write>(config: &Config, out: &mut W) -> Result<()> {
    let mut log = BlockList::open(config.log_path(), 0)?;
    writeln!(out, "[    0.990733] HISTORY: LOADING [{:p}]", log.region().base_addr())?;
    writeln!(out, "[    0.990733] HISTORY: seeking..")?;

    // walking back from the end discovers the tail
    let last = log.prev(None)?;
    let last = last.and_then(|block| log.payload(block)).map(entry);
    writeln!(
        out,
        "[    0.990733] HISTORY: last location - {}",
        last.as_deref().unwrap_or("(none)")
    )?;
    drop(last);

    log.close()
}

fn replay_log<W: Write>(config: &Config, out: &mut W) -> Result<()> {
    let mut log = BlockList::open(config.log_path(), 0)?;
    writeln!(out, "[    1.003915] HISTORY: replay [{:p}]", log.region().base_addr())?;

    // reading forward does not resolve the tail
    let mut current = None;
    let mut cursor = log.next(None)?;
    while let Some(block) = cursor {
        if let Some(payload) = log.payload(block) {
            writeln!(out, "[    1.003915] HISTORY: {}", entry(payload))?;
        }
        current = Some(block);
        cursor = log.next(Some(block))?;
    }

    writeln!(out, "[    1.003915] HISTORY: reverse replay")?;

    if let Some(last) = current {
        let mut cursor = log.prev(Some(last))?;
        while let Some(block) = cursor {
            if let Some(payload) = log.payload(block) {
                writeln!(out, "[    1.003915] HISTORY: {}", entry(payload))?;
            }
            cursor = log.prev(Some(block))?;
        }
    }

    log.close()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> Config {
        Config::from_args(args.iter().map(|s| s.to_string())).unwrap()
    }

    #[test]
    fn test_io_wait_flags() {
        let all = config(&[]);
        assert!((0..7).all(|step| io_wait(&all, step)));

        let skip = config(&["-skip"]);
        assert!(!io_wait(&skip, 0));
        assert!((1..7).all(|step| io_wait(&skip, step)));

        let quiet = config(&["-quiet"]);
        assert!((0..7).all(|step| !io_wait(&quiet, step)));
    }

    #[test]
    fn test_entry_stops_at_nul() {
        assert_eq!(entry(b"gate A4\0junk"), "gate A4");
        assert_eq!(entry(b"no terminator"), "no terminator");
    }
}

//! Line-oriented shells for poking at each store format by hand.
//!
//! Each line is `op [args...]`; only the first character of `op` matters.
//! Errors are printed and the shell keeps going. `q` or `e` (or end of
//! input) leaves the shell, closing whatever is still open.

use std::io::{BufRead, Write};
use std::str::FromStr;

use tracing::debug;

use crate::storage::{BlockList, BlockRef, DiskArray, StrTable};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    BlockList,
    StrTable,
    Array,
}

impl FromStr for ShellKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "list" => Ok(ShellKind::BlockList),
            "table" => Ok(ShellKind::StrTable),
            "array" => Ok(ShellKind::Array),
            other => Err(Error::InvalidArgument(format!(
                "unknown shell '{}', expected list, table or array",
                other
            ))),
        }
    }
}

pub fn run<R: BufRead, W: Write>(kind: ShellKind, input: R, out: &mut W) -> Result<()> {
    match kind {
        ShellKind::BlockList => drive(BlockListShell::default(), input, out),
        ShellKind::StrTable => drive(StrTableShell::default(), input, out),
        ShellKind::Array => drive(ArrayShell::default(), input, out),
    }
}

trait Shell {
    const USAGE: &'static str;

    fn execute<W: Write>(&mut self, op: char, args: &[&str], out: &mut W) -> Result<()>;

    /// Release anything still open when the shell exits
    fn finish(self) -> Result<()>;
}

fn drive<S: Shell, R: BufRead, W: Write>(mut shell: S, input: R, out: &mut W) -> Result<()> {
    write!(out, "{}> ", S::USAGE)?;
    out.flush()?;

    for line in input.lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        if let Some(op) = words.next().and_then(|word| word.chars().next()) {
            let args: Vec<&str> = words.collect();
            debug!(op = %op, ?args, "shell command");
            match op {
                'q' | 'e' => return shell.finish(),
                '?' => write!(out, "{}", S::USAGE)?,
                _ => {
                    if let Err(e) = shell.execute(op, &args, out) {
                        writeln!(out, "error: {}", e)?;
                    }
                }
            }
        }
        write!(out, "> ")?;
        out.flush()?;
    }

    shell.finish()
}

fn arg<T: FromStr>(args: &[&str], pos: usize, what: &str) -> Result<T> {
    args.get(pos)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| Error::InvalidArgument(format!("expected {}", what)))
}

fn opt_arg<T: FromStr + Default>(args: &[&str], pos: usize, what: &str) -> Result<T> {
    match args.get(pos) {
        Some(_) => arg(args, pos, what),
        None => Ok(T::default()),
    }
}

fn not_open(what: &str) -> Error {
    Error::InvalidArgument(format!("no {} is open", what))
}

#[derive(Default)]
struct BlockListShell {
    list: Option<BlockList>,
    cursor: Option<BlockRef>,
}

impl BlockListShell {
    fn list(&mut self) -> Result<&mut BlockList> {
        self.list.as_mut().ok_or_else(|| not_open("list"))
    }

    fn report<W: Write>(&mut self, label: &str, block: Option<BlockRef>, out: &mut W) -> Result<()> {
        let list = self.list()?;
        match block.and_then(|block| Some((block, list.payload(block)?))) {
            Some((block, payload)) => {
                writeln!(out, "{}: {} of {} (end = N)", label, block.size(), payload[0] as char)?
            }
            None => writeln!(out, "{}: 0 of X (end = Y)", label)?,
        }
        self.cursor = block;
        Ok(())
    }
}

impl Shell for BlockListShell {
    const USAGE: &'static str = "m name size      make new list\n\
                                 a size c         append element w/ given size\n\
                                 n                next element\n\
                                 p                prev element\n\
                                 r                reset iterator\n\
                                 c                close list\n\
                                 q                quit\n";

    fn execute<W: Write>(&mut self, op: char, args: &[&str], out: &mut W) -> Result<()> {
        match op {
            'm' => {
                let name: String = arg(args, 0, "a list name")?;
                let size: u32 = opt_arg(args, 1, "a size in bytes")?;
                if let Some(list) = self.list.take() {
                    list.close()?;
                }
                writeln!(out, "Opening file {} (size {})", name, size)?;
                self.list = Some(BlockList::open(&name, size)?);
                self.cursor = None;
            }
            'a' => {
                let size: usize = arg(args, 0, "a block size")?;
                let fill: char = arg(args, 1, "a fill character")?;
                if !fill.is_ascii() {
                    return Err(Error::InvalidArgument("fill character must be ASCII".to_string()));
                }
                let list = self.list()?;
                // a block larger than the whole file cannot fit
                let appended = if size > list.region().len() {
                    false
                } else {
                    list.append(&vec![fill as u8; size])?.is_some()
                };
                if appended {
                    writeln!(out, "appended element ({} * {})", size, fill)?;
                } else {
                    writeln!(out, "could not append {} of {}!", size, fill)?;
                }
            }
            'n' => {
                let cursor = self.cursor;
                let next = self.list()?.next(cursor)?;
                self.report("next", next, out)?;
            }
            'p' => {
                let cursor = self.cursor;
                let prev = self.list()?.prev(cursor)?;
                self.report("prev", prev, out)?;
            }
            'r' => {
                self.cursor = None;
                writeln!(out, "reset iterator")?;
            }
            'c' => {
                let list = self.list.take().ok_or_else(|| not_open("list"))?;
                writeln!(out, "closing...")?;
                self.cursor = None;
                list.close()?;
            }
            _ => write!(out, "{}", Self::USAGE)?,
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        match self.list {
            Some(list) => list.close(),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct StrTableShell {
    table: Option<StrTable>,
}

impl StrTableShell {
    fn table(&mut self) -> Result<&mut StrTable> {
        self.table.as_mut().ok_or_else(|| not_open("table"))
    }
}

impl Shell for StrTableShell {
    const USAGE: &'static str = "n name size    create new table\n\
                                 a element      append element\n\
                                 g index        get element\n\
                                 c              close table\n\
                                 l index        get element length\n\
                                 s              get table length\n\
                                 q              quit\n";

    fn execute<W: Write>(&mut self, op: char, args: &[&str], out: &mut W) -> Result<()> {
        match op {
            'n' => {
                let name: String = arg(args, 0, "a table name")?;
                let size: u32 = opt_arg(args, 1, "a size in bytes")?;
                if let Some(table) = self.table.take() {
                    table.close()?;
                }
                writeln!(out, "Opening file {} (size {})", name, size)?;
                let table = StrTable::open(&name, size)?;
                writeln!(out, "table offset: {:p}", table.region().base_addr())?;
                self.table = Some(table);
            }
            'a' => {
                if args.is_empty() {
                    return Err(Error::InvalidArgument("expected an element".to_string()));
                }
                let element = args.join(" ");
                match self.table()?.add(&element)? {
                    Some(index) => writeln!(out, "added element {}; OK ({})", element, index)?,
                    None => writeln!(out, "added element {}; FAILED", element)?,
                }
            }
            'g' => {
                let index: u32 = arg(args, 0, "an index")?;
                match self.table()?.get(index) {
                    Some(element) => {
                        writeln!(out, "get element {}: {}", index, element.to_string_lossy())?
                    }
                    None => writeln!(out, "get element {}: -", index)?,
                }
            }
            'l' => {
                let index: u32 = arg(args, 0, "an index")?;
                let len = self.table()?.element_len(index).map_or(-1, i64::from);
                writeln!(out, "element {} length: {}", index, len)?;
            }
            's' => {
                let len = self.table()?.len();
                writeln!(out, "table len: {}", len)?;
            }
            'c' => {
                let table = self.table.take().ok_or_else(|| not_open("table"))?;
                writeln!(out, "closing table...")?;
                table.close()?;
            }
            _ => write!(out, "{}", Self::USAGE)?,
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        match self.table {
            Some(table) => table.close(),
            None => Ok(()),
        }
    }
}

/// Arrays opened from this shell hold u64 elements
const ARRAY_ELEMENT_SIZE: u64 = size_of::<u64>() as u64;

#[derive(Default)]
struct ArrayShell {
    array: Option<DiskArray>,
}

impl ArrayShell {
    fn array(&mut self) -> Result<&mut DiskArray> {
        self.array.as_mut().ok_or_else(|| not_open("array"))
    }
}

impl Shell for ArrayShell {
    const USAGE: &'static str = "m name size    make new array\n\
                                 s idx element  set element\n\
                                 g idx          get element\n\
                                 c              close array\n\
                                 p              print elements\n\
                                 q              quit\n";

    fn execute<W: Write>(&mut self, op: char, args: &[&str], out: &mut W) -> Result<()> {
        match op {
            'm' => {
                let name: String = arg(args, 0, "an array name")?;
                let size: u64 = opt_arg(args, 1, "an element count")?;
                if let Some(array) = self.array.take() {
                    array.close()?;
                }
                writeln!(out, "Opening file {} (size {})", name, size)?;
                let array = DiskArray::open(&name, size, ARRAY_ELEMENT_SIZE)?;
                if array.element_size() != ARRAY_ELEMENT_SIZE {
                    array.close()?;
                    return Err(Error::InvalidFormat(format!(
                        "array {} does not hold u64 elements",
                        name
                    )));
                }
                writeln!(out, "array start: {:p}", array.region().base_addr())?;
                writeln!(out, "array size: {}", array.len())?;
                self.array = Some(array);
            }
            's' => {
                let index: u64 = arg(args, 0, "an index")?;
                let value: u64 = arg(args, 1, "a value")?;
                if self.array()?.write(index, &value) {
                    writeln!(out, "set element {} = {}", index, value)?;
                } else {
                    writeln!(out, "index {} out of range", index)?;
                }
            }
            'g' => {
                let index: u64 = arg(args, 0, "an index")?;
                match self.array()?.read::<u64>(index) {
                    Some(value) => writeln!(out, "get element {}: {}", index, value)?,
                    None => writeln!(out, "index {} out of range", index)?,
                }
            }
            'p' => {
                let array = self.array()?;
                let values: Vec<String> = (0..array.len())
                    .filter_map(|index| array.read::<u64>(index))
                    .map(|value| value.to_string())
                    .collect();
                writeln!(out, "[{}]", values.join(", "))?;
            }
            'c' => {
                let array = self.array.take().ok_or_else(|| not_open("array"))?;
                writeln!(out, "closing...")?;
                array.close()?;
            }
            _ => write!(out, "{}", Self::USAGE)?,
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        match self.array {
            Some(array) => array.close(),
            None => Ok(()),
        }
    }
}

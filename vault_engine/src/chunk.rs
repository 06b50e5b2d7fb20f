//! Script chunks attached to a map (prelude, main, validate, veto).
//!
//! A chunk collects source lines from a level file, compiles them once to
//! Lua bytecode and runs the bytecode as often as needed. Error messages that
//! mention the chunk's in-memory name are rewritten to point at the level
//! file and line the code came from.

use std::io::{self, Read, Write};

use log::{debug, warn};
use mlua::{ChunkMode, FromLuaMulti, Function, Lua};
use thiserror::Error;
use vault_data::ChunkKind;

use crate::host::ScriptFatal;
use crate::marshal::{STRING_MAX, read_bytes, read_i32, read_string, read_u8, write_bytes, write_i32, write_string, write_u8};

/// Largest source or bytecode payload a cache file may carry for one chunk.
pub const LUA_CHUNK_MAX_SIZE: usize = 50_000;

const CT_EMPTY: u8 = 0;
const CT_SOURCE: u8 = 1;
const CT_COMPILED: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("{0}")]
    Compile(String),
    #[error("{0}")]
    Runtime(String),
    #[error(transparent)]
    Fatal(#[from] ScriptFatal),
}

impl ChunkError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChunkError::Fatal(_))
    }

    /// Apply `f` to the message of a compile or runtime error.
    pub fn map_message(self, f: impl FnOnce(String) -> String) -> Self {
        match self {
            ChunkError::Compile(m) => ChunkError::Compile(f(m)),
            ChunkError::Runtime(m) => ChunkError::Runtime(f(m)),
            fatal @ ChunkError::Fatal(_) => fatal,
        }
    }
}

/// Outcome of [`LuaChunk::load_call`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkRun<R> {
    /// The chunk has no code; nothing was run.
    Empty,
    Returned(R),
}

/// Plain text of an mlua error, including the traceback of callback errors.
pub(crate) fn error_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::RuntimeError(msg) | mlua::Error::MemoryError(msg) => msg.clone(),
        mlua::Error::CallbackError { traceback, cause } => format!("{}\n{traceback}", error_message(cause)),
        other => other.to_string(),
    }
}

fn memory_error(err: &mlua::Error) -> Option<String> {
    match err {
        mlua::Error::MemoryError(msg) => Some(msg.clone()),
        mlua::Error::CallbackError { cause, .. } => memory_error(cause),
        _ => None,
    }
}

fn classify(err: &mlua::Error, compile: bool) -> ChunkError {
    if let Some(msg) = memory_error(err) {
        return ChunkError::Fatal(ScriptFatal::Memory(msg));
    }
    let msg = error_message(err);
    if compile { ChunkError::Compile(msg) } else { ChunkError::Runtime(msg) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuaChunk {
    file: String,
    chunk: String,
    compiled: Vec<u8>,
    context: String,
    first: i32,
    last: i32,
}

impl LuaChunk {
    pub fn new(context: &str) -> Self {
        Self {
            file: String::new(),
            chunk: String::new(),
            compiled: Vec::new(),
            context: context.to_string(),
            first: -1,
            last: -1,
        }
    }

    pub fn for_kind(kind: ChunkKind) -> Self {
        Self::new(kind.context())
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn first(&self) -> i32 {
        self.first
    }

    pub fn source(&self) -> &str {
        &self.chunk
    }

    pub fn compiled(&self) -> &[u8] {
        &self.compiled
    }

    pub fn is_compiled(&self) -> bool {
        !self.compiled.is_empty()
    }

    pub fn set_file(&mut self, file: &str) {
        self.file = file.to_string();
    }

    /// Replace the source wholesale. Line tracking is left untouched.
    pub fn set_chunk(&mut self, source: &str) {
        self.chunk = source.to_string();
    }

    /// Append `text` from source line `line`, padding with newlines so that
    /// line numbers inside the chunk stay in step with the file.
    pub fn add(&mut self, line: i32, text: &str) {
        if self.first == -1 {
            self.first = line;
        }
        if line != self.last && self.last != -1 {
            while self.last < line {
                self.chunk.push('\n');
                self.last += 1;
            }
        }
        self.chunk.push(' ');
        self.chunk.push_str(text);
        self.last = line;
    }

    pub fn empty(&self) -> bool {
        self.compiled.is_empty() && self.chunk.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.file.clear();
        self.chunk.clear();
        self.compiled.clear();
        self.first = -1;
        self.last = -1;
    }

    /// Compile (or reload the cached bytecode) into a callable function.
    /// Returns `None` for an empty chunk.
    ///
    /// # Errors
    /// Returns [`ChunkError::Compile`] with the interpreter's message.
    pub fn load(&mut self, lua: &Lua) -> Result<Option<Function>, ChunkError> {
        if !self.compiled.is_empty() {
            let func = lua
                .load(&self.compiled[..])
                .set_name(self.context.as_str())
                .set_mode(ChunkMode::Binary)
                .into_function()
                .map_err(|e| classify(&e, true))?;
            return Ok(Some(func));
        }
        if self.empty() {
            self.chunk.clear();
            return Ok(None);
        }

        let func = lua
            .load(self.chunk.as_str())
            .set_name(self.context.as_str())
            .set_mode(ChunkMode::Text)
            .into_function()
            .map_err(|e| classify(&e, true))?;
        self.compiled = func.dump(false);
        self.chunk.clear();
        debug!("compiled {} ({} bytes of bytecode)", self.context, self.compiled.len());
        Ok(Some(func))
    }

    /// Load and run the chunk, converting its return values to `R`.
    ///
    /// # Errors
    /// Compile and runtime failures carry the raw interpreter message; use
    /// [`LuaChunk::rewrite_chunk_errors`] to map it back to the source file.
    pub fn load_call<R: FromLuaMulti>(&mut self, lua: &Lua) -> Result<ChunkRun<R>, ChunkError> {
        let Some(func) = self.load(lua)? else {
            return Ok(ChunkRun::Empty);
        };
        func.call::<R>(()).map(ChunkRun::Returned).map_err(|e| classify(&e, false))
    }

    fn context_marker(&self) -> String {
        format!("[string \"{}\"]:", self.context)
    }

    /// Rewrite references to this chunk in `msg`. True if any were found.
    pub fn rewrite_chunk_errors(&self, msg: &mut String) -> bool {
        let marker = self.context_marker();
        let Some(at) = msg.find(&marker) else {
            return false;
        };
        if at == 0 {
            *msg = self.rewrite_chunk_prefix(msg);
            return true;
        }

        let lines: Vec<&str> = msg.split('\n').map(str::trim).filter(|l| !l.is_empty()).collect();
        let mut rewritten = lines[0].to_string();
        let mut wrote_prefix = false;
        for line in lines.iter().skip(2) {
            if !line.contains(&self.context) {
                continue;
            }
            if wrote_prefix {
                rewritten.push('\n');
                rewritten.push_str(&self.rewrite_chunk_prefix(line));
            } else {
                rewritten = format!("{}: {rewritten}", self.get_chunk_prefix(line));
                wrote_prefix = true;
            }
        }
        *msg = rewritten;
        true
    }

    /// `[string "ctx"]:N: rest` becomes `file:M: rest`, where `M` is the file line.
    fn rewrite_chunk_prefix(&self, line: &str) -> String {
        let marker = self.context_marker();
        let Some(ps) = line.find(&marker) else {
            return line.to_string();
        };
        let lns = ps + marker.len();
        let mut s = line.to_string();
        if let Some(len) = s[lns..].find(':') {
            let pe = lns + len;
            let lnum: i64 = s[lns..pe].trim().parse().unwrap_or(0);
            let real = lnum + i64::from(self.first.max(1)) - 1;
            s = format!("{}{real}{}", &s[..lns], &s[pe..]);
        }
        let tag = if self.file.is_empty() { &self.context } else { &self.file };
        format!("{}{tag}:{}", &s[..ps], &s[lns..])
    }

    /// The rewritten `file:line` part of a traceback frame.
    fn get_chunk_prefix(&self, line: &str) -> String {
        let s = self.rewrite_chunk_prefix(line);
        let mut colons = s.match_indices(':').map(|(i, _)| i);
        match (colons.next(), colons.next()) {
            (Some(_), Some(second)) => s[..second].to_string(),
            _ => s,
        }
    }

    /// Rewrite `msg` for display; unchanged if it does not mention this chunk.
    pub fn orig_error(&self, msg: &str) -> String {
        let mut out = msg.to_string();
        self.rewrite_chunk_errors(&mut out);
        out
    }

    /// # Errors
    /// Fails on I/O errors or an oversized payload.
    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        if self.empty() {
            write_u8(w, CT_EMPTY)?;
        } else if self.compiled.is_empty() {
            write_u8(w, CT_SOURCE)?;
            write_string(w, &self.chunk, LUA_CHUNK_MAX_SIZE)?;
        } else {
            write_u8(w, CT_COMPILED)?;
            write_bytes(w, &self.compiled, LUA_CHUNK_MAX_SIZE)?;
        }
        write_string(w, &self.file, STRING_MAX)?;
        write_i32(w, self.first)
    }

    /// Replace this chunk with one read back from `r`. The context is kept.
    /// An unknown type byte yields an empty chunk.
    ///
    /// # Errors
    /// Fails on I/O errors or an oversized payload.
    pub fn read<R: Read + ?Sized>(&mut self, r: &mut R) -> io::Result<()> {
        self.clear();
        match read_u8(r)? {
            CT_EMPTY => {},
            CT_SOURCE => self.chunk = read_string(r, LUA_CHUNK_MAX_SIZE)?,
            CT_COMPILED => self.compiled = read_bytes(r, LUA_CHUNK_MAX_SIZE)?,
            other => warn!("unknown chunk type {other} for {}; treating it as empty", self.context),
        }
        self.file = read_string(r, STRING_MAX)?;
        self.first = read_i32(r)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn binary_lua() -> Lua {
        unsafe { Lua::unsafe_new_with(mlua::StdLib::ALL_SAFE, mlua::LuaOptions::new()) }
    }

    #[test]
    fn add_pads_to_keep_line_numbers() {
        let mut chunk = LuaChunk::new("dlmain");
        chunk.add(5, "{{");
        chunk.add(8, "}}");
        assert_eq!(chunk.source(), " {{\n\n\n }}");
        assert_eq!(chunk.first(), 5);
    }

    #[test]
    fn same_line_text_is_joined() {
        let mut chunk = LuaChunk::new("dlmain");
        chunk.add(3, "local a = 1");
        chunk.add(3, "local b = 2");
        assert_eq!(chunk.source(), " local a = 1 local b = 2");
    }

    #[test]
    fn single_frame_errors_are_rewritten_in_place() {
        let mut chunk = LuaChunk::new("dlmain");
        chunk.set_file("vaults.des");
        chunk.add(5, "x = 1");
        let mut msg = "[string \"dlmain\"]:2: boom".to_string();
        assert!(chunk.rewrite_chunk_errors(&mut msg));
        assert_eq!(msg, "vaults.des:6: boom");
    }

    #[test]
    fn tracebacks_get_a_prefix_from_the_first_chunk_frame() {
        let mut chunk = LuaChunk::new("dlmain");
        chunk.set_file("vaults.des");
        chunk.add(10, "x = 1");
        let mut msg = [
            "Bad orient: sideways",
            "stack traceback:",
            "\t[C]: in function 'orient'",
            "\t[string \"dlmain\"]:3: in function 'helper'",
            "\t[string \"dlmain\"]:7: in main chunk",
            "\t[C]: in ?",
        ]
        .join("\n");
        assert!(chunk.rewrite_chunk_errors(&mut msg));
        assert_eq!(msg, "vaults.des:12: Bad orient: sideways\nvaults.des:16: in main chunk");
    }

    #[test]
    fn unrelated_messages_are_untouched() {
        let chunk = LuaChunk::new("dlveto");
        let mut msg = "[string \"dlmain\"]:2: boom".to_string();
        assert!(!chunk.rewrite_chunk_errors(&mut msg));
        assert_eq!(chunk.orig_error(&msg), msg);
    }

    #[test]
    fn missing_file_falls_back_to_context() {
        let mut chunk = LuaChunk::new("dlprelude");
        chunk.add(1, "x = 1");
        assert_eq!(chunk.orig_error("[string \"dlprelude\"]:1: oops"), "dlprelude:1: oops");
    }

    #[test]
    fn compile_once_then_run_from_bytecode() {
        let lua = binary_lua();
        let mut chunk = LuaChunk::new("dlmain");
        chunk.add(1, "return 40 + 2");
        assert_eq!(chunk.load_call::<i64>(&lua), Ok(ChunkRun::Returned(42)));
        assert!(chunk.is_compiled());
        assert!(chunk.source().is_empty());
        assert_eq!(chunk.load_call::<i64>(&lua), Ok(ChunkRun::Returned(42)));
    }

    #[test]
    fn empty_chunks_are_skipped() {
        let lua = binary_lua();
        let mut chunk = LuaChunk::new("dlveto");
        chunk.add(4, "   ");
        assert_eq!(chunk.load_call::<bool>(&lua), Ok(ChunkRun::Empty));
    }

    #[test]
    fn syntax_errors_are_compile_errors() {
        let lua = binary_lua();
        let mut chunk = LuaChunk::new("dlmain");
        chunk.set_file("bad.des");
        chunk.add(20, "if then");
        let err = chunk.load_call::<()>(&lua).unwrap_err();
        let ChunkError::Compile(msg) = err else {
            panic!("expected a compile error, got {err:?}");
        };
        assert!(chunk.orig_error(&msg).starts_with("bad.des:20:"), "{msg}");
    }

    #[test]
    fn write_read_round_trip() {
        let lua = binary_lua();
        let mut chunk = LuaChunk::new("dlvalidate");
        chunk.set_file("a.des");
        chunk.add(7, "return true");

        let mut source_only = Vec::new();
        chunk.write(&mut source_only).unwrap();
        let mut back = LuaChunk::new("dlvalidate");
        back.read(&mut Cursor::new(source_only)).unwrap();
        assert_eq!(back.source(), chunk.source());
        assert_eq!((back.file(), back.first()), ("a.des", 7));

        chunk.load(&lua).unwrap();
        let mut compiled = Vec::new();
        chunk.write(&mut compiled).unwrap();
        let mut back = LuaChunk::new("dlvalidate");
        back.read(&mut Cursor::new(compiled)).unwrap();
        assert_eq!(back.compiled(), chunk.compiled());
        assert_eq!(back.load_call::<bool>(&lua), Ok(ChunkRun::Returned(true)));
    }

    #[test]
    fn unknown_type_byte_reads_as_empty() {
        let mut bytes = vec![9u8];
        write_string(&mut bytes, "x.des", STRING_MAX).unwrap();
        write_i32(&mut bytes, 3).unwrap();
        let mut chunk = LuaChunk::new("dlmain");
        chunk.read(&mut Cursor::new(bytes)).unwrap();
        assert!(chunk.empty());
        assert_eq!((chunk.file(), chunk.first()), ("x.des", 3));
    }
}

//! The embedded Lua interpreter that map chunks run in.
//!
//! One [`ScriptHost`] owns one interpreter. The `dgn` table is installed at
//! construction; while [`ScriptHost::with_map`] runs, the bindings operate on
//! the map that was lent to it. Nested host calls are counted and a runaway
//! script is stopped by the call depth ceiling, the instruction budget or
//! the memory limit. Those stops are fatal and end the whole invocation.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::{Context, Result};
use log::{error, info};
use mlua::{FromLuaMulti, HookTriggers, Lua, LuaOptions, StdLib, VmState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::catalog::Catalog;
use crate::chunk::{ChunkError, ChunkRun, LuaChunk};
use crate::config::EngineConfig;
use crate::dgn;
use crate::mapdef::MapDef;

/// Conditions that abort a script invocation outright.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptFatal {
    #[error("script call depth exceeded (limit {limit})")]
    CallDepth { limit: usize },
    #[error("script memory limit reached: {0}")]
    Memory(String),
    #[error("script instruction budget exhausted (limit {limit})")]
    InstructionBudget { limit: u64 },
}

/// State shared between the host and the `dgn` callbacks.
pub(crate) struct HostState {
    pub(crate) map: RefCell<Option<MapDef>>,
    pub(crate) catalog: Catalog,
    pub(crate) rng: RefCell<StdRng>,
    depth: Cell<usize>,
    max_depth: usize,
    fatal: RefCell<Option<ScriptFatal>>,
    instructions: Cell<u64>,
}

/// Decrements the call depth when dropped.
pub(crate) struct DepthGuard<'a> {
    state: &'a HostState,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.state.depth.set(self.state.depth.get().saturating_sub(1));
    }
}

impl HostState {
    /// Enter one level of host/script nesting.
    pub(crate) fn enter(&self) -> Result<DepthGuard<'_>, ScriptFatal> {
        if let Some(fatal) = self.fatal.borrow().clone() {
            return Err(fatal);
        }
        let depth = self.depth.get() + 1;
        if depth > self.max_depth {
            let fatal = ScriptFatal::CallDepth { limit: self.max_depth };
            self.set_fatal(fatal.clone());
            return Err(fatal);
        }
        self.depth.set(depth);
        Ok(DepthGuard { state: self })
    }

    pub(crate) fn set_fatal(&self, fatal: ScriptFatal) {
        let mut slot = self.fatal.borrow_mut();
        if slot.is_none() {
            *slot = Some(fatal);
        }
    }

    fn take_fatal(&self) -> Option<ScriptFatal> {
        self.fatal.borrow_mut().take()
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth.get()
    }
}

pub struct ScriptHost {
    lua: Lua,
    state: Rc<HostState>,
    instruction_budget: u64,
    hook_interval: u32,
}

impl ScriptHost {
    /// Create an interpreter with the `dgn` bindings installed.
    ///
    /// # Errors
    /// Fails if the memory limit or the bindings cannot be installed.
    pub fn new(config: &EngineConfig, catalog: Catalog) -> Result<Self> {
        // Bytecode reloads need binary chunk loading, which the safe constructor disables.
        let lua = unsafe { Lua::unsafe_new_with(StdLib::ALL_SAFE, LuaOptions::new()) };
        if config.memory_limit_kb > 0 {
            lua.set_memory_limit(config.memory_limit_kb.saturating_mul(1024))
                .context("setting script memory limit")?;
        }
        let state = Rc::new(HostState {
            map: RefCell::new(None),
            catalog,
            rng: RefCell::new(StdRng::seed_from_u64(0)),
            depth: Cell::new(0),
            max_depth: config.max_call_depth.max(1),
            fatal: RefCell::new(None),
            instructions: Cell::new(0),
        });
        dgn::install(&lua, &state).context("installing dgn bindings")?;
        info!(
            "script host ready (call depth {}, {} KB, {} instructions)",
            config.max_call_depth, config.memory_limit_kb, config.instruction_budget
        );
        Ok(Self {
            lua,
            state,
            instruction_budget: config.instruction_budget,
            hook_interval: config.hook_interval.max(1),
        })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn catalog(&self) -> &Catalog {
        &self.state.catalog
    }

    fn install_budget_hook(&self) {
        if self.instruction_budget == 0 {
            return;
        }
        let state = Rc::clone(&self.state);
        let budget = self.instruction_budget;
        let interval = self.hook_interval;
        self.lua
            .set_hook(HookTriggers::new().every_nth_instruction(interval), move |_lua, _debug| {
                let used = state.instructions.get() + u64::from(interval);
                state.instructions.set(used);
                if used > budget {
                    state.set_fatal(ScriptFatal::InstructionBudget { limit: budget });
                    return Err(mlua::Error::RuntimeError(format!(
                        "instruction budget of {budget} exhausted"
                    )));
                }
                Ok(VmState::Continue)
            });
    }

    /// Run one chunk under the host's limits.
    ///
    /// # Errors
    /// Compile and runtime errors carry the raw interpreter message. Any fatal
    /// condition raised during the call is returned as [`ChunkError::Fatal`],
    /// even if the script caught the error that signalled it.
    pub fn call_chunk<R: FromLuaMulti>(&self, chunk: &mut LuaChunk) -> Result<ChunkRun<R>, ChunkError> {
        let top_level = self.state.depth() == 0;
        if top_level {
            self.state.instructions.set(0);
            self.state.take_fatal();
            self.install_budget_hook();
        }
        let result = match self.state.enter() {
            Ok(_guard) => chunk.load_call::<R>(&self.lua),
            Err(fatal) => Err(ChunkError::Fatal(fatal)),
        };
        if top_level {
            self.lua.remove_hook();
        }
        if let Some(fatal) = self.state.take_fatal() {
            error!("{}: {fatal}", chunk.context());
            return Err(ChunkError::Fatal(fatal));
        }
        if let Err(ChunkError::Fatal(fatal)) = &result {
            error!("{}: {fatal}", chunk.context());
        }
        result
    }

    /// Lend `map` to the `dgn` bindings for the duration of `f`.
    ///
    /// Binding randomness is drawn from a generator seeded from `rng`.
    pub fn with_map<T, R: Rng + ?Sized>(&self, map: &mut MapDef, rng: &mut R, f: impl FnOnce(&Self) -> T) -> T {
        let previous = self.state.map.replace(Some(std::mem::take(map)));
        *self.state.rng.borrow_mut() = StdRng::seed_from_u64(rng.random());
        let out = f(self);
        if let Some(back) = self.state.map.replace(previous) {
            *map = back;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    fn host(config: &EngineConfig) -> ScriptHost {
        ScriptHost::new(config, Catalog::builtin().unwrap()).unwrap()
    }

    fn chunk(src: &str) -> LuaChunk {
        let mut c = LuaChunk::new("dlmain");
        c.add(1, src);
        c
    }

    #[test]
    fn plain_chunks_run() {
        let host = host(&EngineConfig::default());
        assert_eq!(host.call_chunk::<i64>(&mut chunk("return 6 * 7")), Ok(ChunkRun::Returned(42)));
    }

    #[test]
    fn depth_ceiling_is_fatal() {
        let config = EngineConfig {
            max_call_depth: 1,
            ..EngineConfig::default()
        };
        let host = host(&config);
        let mut map = MapDef::new("deep");
        let mut rng = StdRng::seed_from_u64(1);
        let result = host.with_map(&mut map, &mut rng, |h| {
            h.call_chunk::<()>(&mut chunk("local ok = pcall(dgn.name) return ok"))
        });
        assert_eq!(result, Err(ChunkError::Fatal(ScriptFatal::CallDepth { limit: 1 })));

        // The next top-level call starts clean.
        assert_eq!(host.call_chunk::<i64>(&mut chunk("return 1")), Ok(ChunkRun::Returned(1)));
    }

    #[test]
    fn runaway_loops_hit_the_instruction_budget() {
        let config = EngineConfig {
            instruction_budget: 100_000,
            ..EngineConfig::default()
        };
        let host = host(&config);
        let err = host.call_chunk::<()>(&mut chunk("while true do end")).unwrap_err();
        assert_eq!(err, ChunkError::Fatal(ScriptFatal::InstructionBudget { limit: 100_000 }));
    }

    #[test]
    fn memory_ceiling_is_fatal() {
        let config = EngineConfig {
            memory_limit_kb: 2048,
            ..EngineConfig::default()
        };
        let host = host(&config);
        let err = host
            .call_chunk::<()>(&mut chunk("local t = {} for i = 1, 1e8 do t[i] = ('x'):rep(64) .. i end"))
            .unwrap_err();
        assert!(matches!(err, ChunkError::Fatal(ScriptFatal::Memory(_))), "{err:?}");
    }

    #[test]
    fn with_map_returns_the_edited_map() {
        let host = host(&EngineConfig::default());
        let mut map = MapDef::new("edited");
        let mut rng = StdRng::seed_from_u64(1);
        host.with_map(&mut map, &mut rng, |h| {
            h.call_chunk::<()>(&mut chunk("dgn.tags('no_rotate') dgn.map('x.x')"))
        })
        .unwrap();
        assert_eq!(map.name, "edited");
        assert!(map.tags.has("no_rotate"));
        assert_eq!(map.map.get_lines(), vec!["x.x"]);
    }
}

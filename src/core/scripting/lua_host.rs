// src/core/scripting/lua_host.rs

//! A `ScriptHost` backed by an embedded Lua VM. Callbacks are global Lua
//! functions taking the message payload as their only argument.

use crate::core::dispatch::{CallbackError, ScriptHost};
use anyhow::Context;
use mlua::{Lua, Value};
use std::fs;
use std::path::Path;
use tracing::info;

pub struct LuaHost {
    name: String,
    lua: Lua,
}

impl LuaHost {
    /// Creates an empty VM with file, process and dynamic-loading access removed.
    pub fn new(name: impl Into<String>) -> mlua::Result<Self> {
        let lua = Lua::new();
        {
            let globals = lua.globals();
            globals.set("loadfile", Value::Nil)?;
            globals.set("dofile", Value::Nil)?;
            if let Ok(Value::Table(os_table)) = globals.get::<Value>("os") {
                os_table.set("execute", Value::Nil)?;
                os_table.set("exit", Value::Nil)?;
                os_table.set("remove", Value::Nil)?;
                os_table.set("rename", Value::Nil)?;
            }
            if let Ok(Value::Table(io_table)) = globals.get::<Value>("io") {
                io_table.set("open", Value::Nil)?;
                io_table.set("popen", Value::Nil)?;
            }
        }
        Ok(Self {
            name: name.into(),
            lua,
        })
    }

    /// Creates a VM and runs `source` in it.
    pub fn from_source(name: impl Into<String>, source: &str) -> mlua::Result<Self> {
        let host = Self::new(name)?;
        host.exec(source)?;
        Ok(host)
    }

    /// Creates a VM and runs the script at `path` in it.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read script '{}'", path.display()))?;
        let host = Self::from_source(path.display().to_string(), &source)
            .map_err(|e| anyhow::anyhow!("Failed to load script '{}': {e}", path.display()))?;
        info!("loaded script '{}'", path.display());
        Ok(host)
    }

    /// Runs a chunk of Lua in this VM's global environment.
    pub fn exec(&self, source: &str) -> mlua::Result<()> {
        self.lua.load(source).set_name(self.name.as_str()).exec()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct access to the VM, e.g. to read globals a callback wrote.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }
}

impl ScriptHost for LuaHost {
    fn invoke(&mut self, callback: &str, payload: &str) -> Result<(), CallbackError> {
        let failed = |e: mlua::Error| CallbackError::Failed {
            callback: callback.to_string(),
            reason: e.to_string(),
        };
        match self.lua.globals().get::<Value>(callback).map_err(failed)? {
            Value::Function(function) => function.call::<()>(payload).map_err(failed),
            _ => Err(CallbackError::NotFound(callback.to_string())),
        }
    }
}

//! The `dgn` table map scripts call into.
//!
//! Every function works on the map currently lent to the host by
//! [`ScriptHost::with_map`](crate::host::ScriptHost::with_map); calling one
//! outside of that is a script error. Each entry counts towards the host's
//! call depth.

use std::rc::Rc;

use mlua::{IntoLua, IntoLuaMulti, Lua, MultiValue, Table, Value, Variadic};
use rand::rngs::StdRng;
use vault_data::{LevelRange, MapSection};

use crate::catalog::Catalog;
use crate::grid::Coord;
use crate::host::HostState;
use crate::mapdef::{KeyField, MapDef};

/// What a binding gets to work with.
struct Binding<'a> {
    map: &'a mut MapDef,
    catalog: &'a Catalog,
    rng: &'a mut StdRng,
}

fn script_error(msg: impl Into<String>) -> mlua::Error {
    mlua::Error::RuntimeError(msg.into())
}

fn bad_argument(fname: &str, index: usize, expected: &str, got: Option<&Value>) -> mlua::Error {
    let got = got.map_or("no value", Value::type_name);
    script_error(format!("bad argument #{} to '{fname}' ({expected} expected, got {got})", index + 1))
}

fn is_nil(args: &[Value], index: usize) -> bool {
    matches!(args.get(index), Some(Value::Nil))
}

#[allow(clippy::cast_possible_truncation)]
fn as_int(value: Option<&Value>) -> Option<i64> {
    match value {
        Some(Value::Integer(n)) => Some(*n),
        Some(Value::Number(n)) if n.fract().abs() < f64::EPSILON => Some(*n as i64),
        _ => None,
    }
}

fn check_int(args: &[Value], index: usize, fname: &str) -> mlua::Result<i64> {
    as_int(args.get(index)).ok_or_else(|| bad_argument(fname, index, "integer", args.get(index)))
}

fn check_string(args: &[Value], index: usize, fname: &str) -> mlua::Result<String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.to_string_lossy().into()),
        Some(Value::Integer(n)) => Ok(n.to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        other => Err(bad_argument(fname, index, "string", other)),
    }
}

fn check_glyph(args: &[Value], index: usize, fname: &str) -> mlua::Result<char> {
    check_string(args, index, fname)?
        .chars()
        .next()
        .ok_or_else(|| script_error(format!("{fname}: empty glyph")))
}

fn string_table(lua: &Lua, strings: Vec<String>) -> mlua::Result<Table> {
    lua.create_sequence_from(strings)
}

fn register<R, F>(lua: &Lua, dgn: &Table, state: &Rc<HostState>, name: &'static str, f: F) -> mlua::Result<()>
where
    R: IntoLuaMulti,
    F: Fn(&Lua, &mut Binding<'_>, &[Value]) -> mlua::Result<R> + 'static,
{
    let state = Rc::clone(state);
    let func = lua.create_function(move |lua, args: MultiValue| {
        let _guard = state.enter().map_err(|fatal| script_error(fatal.to_string()))?;
        let mut slot = state.map.borrow_mut();
        let map = slot
            .as_mut()
            .ok_or_else(|| script_error(format!("dgn.{name}: no map is being built")))?;
        let mut rng = state.rng.borrow_mut();
        let mut binding = Binding {
            map,
            catalog: &state.catalog,
            rng: &mut rng,
        };
        let args: Vec<Value> = args.into_iter().collect();
        f(lua, &mut binding, &args)
    })?;
    dgn.set(name, func)
}

/// Shared by `depth` and `default_depth`: no arguments reads the list,
/// `nil` clears it, strings replace it.
fn depth_list(lua: &Lua, ranges: &mut Vec<LevelRange>, args: &[Value], fname: &str) -> mlua::Result<Value> {
    if args.is_empty() {
        let list = ranges.iter().map(LevelRange::describe).collect::<Vec<_>>().join(", ");
        return list.into_lua(lua);
    }
    ranges.clear();
    if is_nil(args, 0) {
        return Ok(Value::Nil);
    }
    for index in 0..args.len() {
        let list = check_string(args, index, fname)?;
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            ranges.push(LevelRange::parse(part).map_err(|e| script_error(e.to_string()))?);
        }
    }
    Ok(Value::Nil)
}

fn key_field(b: &mut Binding<'_>, args: &[Value], fname: &str, field: KeyField) -> mlua::Result<()> {
    let spec = check_string(args, 0, fname)?;
    b.map
        .add_key_field(&spec, field, b.catalog, b.rng)
        .map_err(|e| script_error(e.to_string()))
}

fn coords(cs: impl IntoIterator<Item = Coord>) -> Variadic<i32> {
    cs.into_iter().flat_map(|c| [c.x, c.y]).collect()
}

/// Install the `dgn` table into the interpreter's globals.
pub(crate) fn install(lua: &Lua, state: &Rc<HostState>) -> mlua::Result<()> {
    let dgn = lua.create_table()?;

    register(lua, &dgn, state, "name", |lua, b, _| b.map.name.as_str().into_lua(lua))?;

    register(lua, &dgn, state, "depth", |lua, b, args| depth_list(lua, &mut b.map.depths, args, "depth"))?;
    register(lua, &dgn, state, "default_depth", |lua, b, args| {
        depth_list(lua, &mut b.map.default_depths, args, "default_depth")
    })?;

    register(lua, &dgn, state, "place", |_, b, args| {
        if is_nil(args, 0) {
            b.map.place.clear();
        } else if !args.is_empty() {
            b.map.place = check_string(args, 0, "place")?;
        }
        Ok(b.map.place.clone())
    })?;

    register(lua, &dgn, state, "tags", |_, b, args| {
        if is_nil(args, 0) {
            b.map.tags.clear();
        } else if !args.is_empty() {
            b.map.tags.add(&check_string(args, 0, "tags")?);
        }
        Ok(b.map.tags.describe())
    })?;
    register(lua, &dgn, state, "tags_remove", |_, b, args| {
        for index in 0..args.len() {
            b.map.tags.remove(&check_string(args, index, "tags_remove")?);
        }
        Ok(b.map.tags.describe())
    })?;

    for name in ["weight", "chance"] {
        register(lua, &dgn, state, name, move |_, b, args| {
            if !args.is_empty() && !is_nil(args, 0) {
                let chance = check_int(args, 0, name)?;
                b.map.chance = i32::try_from(chance).map_err(|_| script_error(format!("{name}: {chance} is too large")))?;
            }
            Ok(b.map.chance)
        })?;
    }

    register(lua, &dgn, state, "orient", |_, b, args| {
        if is_nil(args, 0) {
            b.map.orient = MapSection::None;
        } else if !args.is_empty() {
            let name = check_string(args, 0, "orient")?;
            b.map.orient = MapSection::from_name(&name).ok_or_else(|| script_error(format!("Bad orient: {name}")))?;
        }
        Ok(b.map.orient.name())
    })?;

    register(lua, &dgn, state, "shuffle", |lua, b, args| {
        if args.is_empty() {
            return string_table(lua, b.map.get_shuffle_strings()).map(Some);
        }
        for index in 0..args.len() {
            if is_nil(args, index) {
                b.map.map.clear_shuffles();
            } else {
                let spec = check_string(args, index, "shuffle")?;
                b.map.map.add_shuffle(&spec).map_err(|e| script_error(e.to_string()))?;
            }
        }
        Ok(None)
    })?;
    register(lua, &dgn, state, "shuffle_remove", |_, b, args| {
        for index in 0..args.len() {
            b.map.map.remove_shuffle(&check_string(args, index, "shuffle_remove")?);
        }
        Ok(())
    })?;

    register(lua, &dgn, state, "subst", |lua, b, args| {
        if args.is_empty() {
            return string_table(lua, b.map.get_subst_strings()).map(Some);
        }
        for index in 0..args.len() {
            if is_nil(args, index) {
                b.map.map.clear_substs();
            } else {
                let spec = check_string(args, index, "subst")?;
                b.map.map.add_subst(&spec).map_err(|e| script_error(e.to_string()))?;
            }
        }
        Ok(None)
    })?;
    register(lua, &dgn, state, "subst_remove", |_, b, args| {
        for index in 0..args.len() {
            b.map.map.remove_subst(&check_string(args, index, "subst_remove")?);
        }
        Ok(())
    })?;

    register(lua, &dgn, state, "map", |lua, b, args| {
        if args.is_empty() {
            return string_table(lua, b.map.map.get_lines()).map(Value::Table);
        }
        if is_nil(args, 0) {
            b.map.map.clear();
            return Ok(Value::Nil);
        }
        let Some(index) = as_int(args.first()) else {
            b.map.map.add_line(&check_string(args, 0, "map")?);
            return Ok(Value::Nil);
        };
        if args.len() == 1 {
            let line = b.map.map.line_at(index).map_err(|e| script_error(e.to_string()))?;
            return line.into_lua(lua);
        }
        if is_nil(args, 1) {
            return Ok(if b.map.map.remove_line_at(index) { Value::Boolean(true) } else { Value::Nil });
        }
        let line = check_string(args, 1, "map")?;
        b.map.map.set_line_at(index, &line).map_err(|e| script_error(e.to_string()))?;
        Ok(Value::Nil)
    })?;

    register(lua, &dgn, state, "mons", |_, b, args| {
        if is_nil(args, 0) {
            b.map.mons.clear();
        } else if let Some(index) = as_int(args.first()) {
            let spec = check_string(args, 1, "mons")?;
            b.map.mons.set_mons(index, &spec, b.catalog).map_err(|e| script_error(e.to_string()))?;
        } else if !args.is_empty() {
            let spec = check_string(args, 0, "mons")?;
            b.map
                .mons
                .add_mons_list(&spec, false, b.catalog, b.rng)
                .map_err(|e| script_error(e.to_string()))?;
        }
        Ok(b.map.mons.len())
    })?;

    register(lua, &dgn, state, "item", |_, b, args| {
        if is_nil(args, 0) {
            b.map.items.clear();
        } else if let Some(index) = as_int(args.first()) {
            let spec = check_string(args, 1, "item")?;
            b.map.items.set_item(index, &spec, b.catalog).map_err(|e| script_error(e.to_string()))?;
        } else if !args.is_empty() {
            let spec = check_string(args, 0, "item")?;
            b.map
                .items
                .add_item_list(&spec, false, b.catalog, b.rng)
                .map_err(|e| script_error(e.to_string()))?;
        }
        Ok(b.map.items.len())
    })?;

    register(lua, &dgn, state, "kfeat", |_, b, args| key_field(b, args, "kfeat", KeyField::Feat))?;
    register(lua, &dgn, state, "kmons", |_, b, args| key_field(b, args, "kmons", KeyField::Mons))?;
    register(lua, &dgn, state, "kitem", |_, b, args| key_field(b, args, "kitem", KeyField::Item))?;

    register(lua, &dgn, state, "gly_point", |_, b, args| {
        let glyph = check_glyph(args, 0, "gly_point")?;
        Ok(coords(b.map.find_first_glyph(glyph)))
    })?;
    register(lua, &dgn, state, "gly_points", |_, b, args| {
        let glyph = check_glyph(args, 0, "gly_points")?;
        Ok(coords(b.map.find_glyph(glyph)))
    })?;

    register(lua, &dgn, state, "points_connected", |_, b, args| {
        if args.len() < 4 {
            return Err(script_error("Not enough points to test connectedness (need at least two)"));
        }
        let mut points = Vec::with_capacity(args.len() / 2);
        for index in (0..args.len() - 1).step_by(2) {
            let x = check_int(args, index, "points_connected")?;
            let y = check_int(args, index + 1, "points_connected")?;
            let (Ok(x), Ok(y)) = (i32::try_from(x), i32::try_from(y)) else {
                return Err(script_error(format!("points_connected: ({x},{y}) is out of range")));
            };
            points.push(Coord::new(x, y));
        }
        Ok(b.map.points_connected(points[0], &points[1..]))
    })?;

    register(lua, &dgn, state, "original_map", |_, b, _| Ok(b.map.original.map(|id| id.to_string())))?;

    lua.globals().set("dgn", dgn)
}

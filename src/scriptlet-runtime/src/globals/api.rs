use alloc::format;
use alloc::string::{String, ToString as _};

use rquickjs::object::Property;
use rquickjs::prelude::Opt;
use rquickjs::{Coerced, Ctx, Exception, Function, Module, Object, Value};
use scriptlet_common::{capability, API_MODULE_NAME};
use sha2::{Digest, Sha256};

use crate::modules::io::io::print;
use crate::utils::as_bytes;

/// Resolves the dynamically-registered `api` module and invokes its `call` function with
/// a `{type, method, params}` envelope, matching what `scriptlet-sandbox`'s
/// `GuestCallbackRequest` expects on the other side of the FFI boundary.
///
/// The host's response crosses back as a JSON string (its own `ok`/`result`/`error`
/// envelope), so it takes a second `json_parse` here to turn into a real JS value —
/// the same double-encoding every `api.*` host call goes through.
fn call_broker<'js>(
    ctx: &Ctx<'js>,
    capability: &str,
    method: &str,
    params: Object<'js>,
) -> rquickjs::Result<Value<'js>> {
    let api: Object = Module::import(ctx, API_MODULE_NAME)?.finish()?;
    let call: Function = api.get("call")?;

    let envelope = Object::new(ctx.clone())?;
    envelope.set("type", capability)?;
    envelope.set("method", method)?;
    envelope.set("params", params)?;
    let envelope_json = ctx
        .json_stringify(envelope)?
        .map(|s| s.to_string())
        .transpose()?
        .unwrap_or_else(|| "{}".to_string());

    let raw: String = call.call((envelope_json,))?;
    let response: Value = ctx.json_parse(raw)?;
    let response = response
        .as_object()
        .ok_or_else(|| Exception::throw_internal(ctx, "broker returned a non-object response"))?;

    if response.get::<_, bool>("ok")? {
        response.get("result")
    } else {
        let error: Option<String> = response.get("error")?;
        Err(Exception::throw_type(ctx, &error.unwrap_or_else(|| "broker call failed".to_string())))
    }
}

fn log_line(level: &str, message: String) {
    print(format!("[{level}] {message}\n"));
}

#[rquickjs::function]
fn info(message: Coerced<String>) {
    log_line("INFO", message.0);
}

#[rquickjs::function]
fn error(message: Coerced<String>) {
    log_line("ERROR", message.0);
}

#[rquickjs::function]
fn warn(message: Coerced<String>) {
    log_line("WARN", message.0);
}

#[rquickjs::function]
fn debug(message: Coerced<String>) {
    log_line("DEBUG", message.0);
}

/// `Date.now()` already works inside the guest, backed by the `_current_time` FFI hook —
/// no need to reimplement clock handling here.
#[rquickjs::function]
fn now(ctx: Ctx<'_>) -> rquickjs::Result<f64> {
    let date: Object = ctx.globals().get("Date")?;
    let now: Function = date.get("now")?;
    now.call(())
}

/// The guest has no entropy source of its own, so a uuid is generated host-side. Unlike
/// `call`, the host's output here is a plain string rather than pre-serialized JSON, so
/// it needs no second parse.
#[rquickjs::function]
fn uuid(ctx: Ctx<'_>) -> rquickjs::Result<String> {
    let api: Object = Module::import(&ctx, API_MODULE_NAME)?.finish()?;
    let uuid_fn: Function = api.get("uuid")?;
    uuid_fn.call((String::new(),))
}

#[rquickjs::function]
fn hash(data: Value<'_>) -> rquickjs::Result<String> {
    let bytes = as_bytes(data)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[rquickjs::function]
fn parse_json<'js>(ctx: Ctx<'js>, text: String) -> rquickjs::Result<Value<'js>> {
    ctx.json_parse(text)
}

#[rquickjs::function]
fn get_script_info(ctx: Ctx<'_>) -> rquickjs::Result<Value<'_>> {
    let api: Object = Module::import(&ctx, API_MODULE_NAME)?.finish()?;
    let info_fn: Function = api.get("info")?;
    let raw: String = info_fn.call((String::new(),))?;
    ctx.json_parse(raw)
}

#[rquickjs::function]
fn db_query<'js>(
    ctx: Ctx<'js>,
    sql: String,
    bindings: Opt<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let params = Object::new(ctx.clone())?;
    params.set("sql", sql)?;
    if let Some(bindings) = bindings.0 {
        params.set("bindings", bindings)?;
    }
    call_broker(&ctx, capability::DATABASE, "query", params)
}

#[rquickjs::function]
fn db_select<'js>(
    ctx: Ctx<'js>,
    table: String,
    columns: Value<'js>,
    conditions: Opt<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let params = Object::new(ctx.clone())?;
    params.set("table", table)?;
    params.set("columns", columns)?;
    if let Some(conditions) = conditions.0 {
        params.set("conditions", conditions)?;
    }
    call_broker(&ctx, capability::DATABASE, "select", params)
}

#[rquickjs::function]
fn db_insert<'js>(ctx: Ctx<'js>, table: String, data: Value<'js>) -> rquickjs::Result<Value<'js>> {
    let params = Object::new(ctx.clone())?;
    params.set("table", table)?;
    params.set("data", data)?;
    call_broker(&ctx, capability::DATABASE, "insert", params)
}

#[rquickjs::function]
fn db_update<'js>(
    ctx: Ctx<'js>,
    table: String,
    data: Value<'js>,
    conditions: Value<'js>,
) -> rquickjs::Result<Value<'js>> {
    let params = Object::new(ctx.clone())?;
    params.set("table", table)?;
    params.set("data", data)?;
    params.set("conditions", conditions)?;
    call_broker(&ctx, capability::DATABASE, "update", params)
}

#[rquickjs::function]
fn db_delete<'js>(
    ctx: Ctx<'js>,
    table: String,
    conditions: Value<'js>,
) -> rquickjs::Result<Value<'js>> {
    let params = Object::new(ctx.clone())?;
    params.set("table", table)?;
    params.set("conditions", conditions)?;
    call_broker(&ctx, capability::DATABASE, "delete", params)
}

fn http_call<'js>(
    ctx: Ctx<'js>,
    verb: &str,
    url: String,
    body: Opt<Value<'js>>,
    headers: Opt<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let params = Object::new(ctx.clone())?;
    params.set("url", url)?;
    params.set("method", verb)?;
    if let Some(body) = body.0 {
        params.set("body", body)?;
    }
    if let Some(headers) = headers.0 {
        params.set("headers", headers)?;
    }
    call_broker(&ctx, capability::HTTP, &verb.to_lowercase(), params)
}

#[rquickjs::function]
fn http_get<'js>(
    ctx: Ctx<'js>,
    url: String,
    body: Opt<Value<'js>>,
    headers: Opt<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    http_call(ctx, "GET", url, body, headers)
}

#[rquickjs::function]
fn http_post<'js>(
    ctx: Ctx<'js>,
    url: String,
    body: Opt<Value<'js>>,
    headers: Opt<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    http_call(ctx, "POST", url, body, headers)
}

#[rquickjs::function]
fn http_put<'js>(
    ctx: Ctx<'js>,
    url: String,
    body: Opt<Value<'js>>,
    headers: Opt<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    http_call(ctx, "PUT", url, body, headers)
}

#[rquickjs::function]
fn http_patch<'js>(
    ctx: Ctx<'js>,
    url: String,
    body: Opt<Value<'js>>,
    headers: Opt<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    http_call(ctx, "PATCH", url, body, headers)
}

#[rquickjs::function]
fn http_delete<'js>(
    ctx: Ctx<'js>,
    url: String,
    body: Opt<Value<'js>>,
    headers: Opt<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    http_call(ctx, "DELETE", url, body, headers)
}

#[rquickjs::function]
fn events_dispatch<'js>(
    ctx: Ctx<'js>,
    name: String,
    data: Value<'js>,
) -> rquickjs::Result<Value<'js>> {
    let params = Object::new(ctx.clone())?;
    params.set("name", name)?;
    params.set("payload", data)?;
    call_broker(&ctx, capability::EVENTS, "dispatch", params)
}

pub fn setup(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    let log = Object::new(ctx.clone())?;
    log.set("info", Function::new(ctx.clone(), info)?)?;
    log.set("error", Function::new(ctx.clone(), error)?)?;
    log.set("warn", Function::new(ctx.clone(), warn)?)?;
    log.set("debug", Function::new(ctx.clone(), debug)?)?;

    let utils = Object::new(ctx.clone())?;
    utils.set("now", Function::new(ctx.clone(), now)?)?;
    utils.set("uuid", Function::new(ctx.clone(), uuid)?)?;
    utils.set("hash", Function::new(ctx.clone(), hash)?)?;
    utils.set("parseJson", Function::new(ctx.clone(), parse_json)?)?;

    let database = Object::new(ctx.clone())?;
    database.set("query", Function::new(ctx.clone(), db_query)?)?;
    database.set("select", Function::new(ctx.clone(), db_select)?)?;
    database.set("insert", Function::new(ctx.clone(), db_insert)?)?;
    database.set("update", Function::new(ctx.clone(), db_update)?)?;
    database.set("delete", Function::new(ctx.clone(), db_delete)?)?;

    let http = Object::new(ctx.clone())?;
    http.set("get", Function::new(ctx.clone(), http_get)?)?;
    http.set("post", Function::new(ctx.clone(), http_post)?)?;
    http.set("put", Function::new(ctx.clone(), http_put)?)?;
    http.set("patch", Function::new(ctx.clone(), http_patch)?)?;
    http.set("delete", Function::new(ctx.clone(), http_delete)?)?;

    let events = Object::new(ctx.clone())?;
    events.set("dispatch", Function::new(ctx.clone(), events_dispatch)?)?;

    let api = Object::new(ctx.clone())?;
    api.set("log", log)?;
    api.set("utils", utils)?;
    api.set("database", database)?;
    api.set("http", http)?;
    api.set("events", events)?;
    api.set("getScriptInfo", Function::new(ctx.clone(), get_script_info)?)?;

    globals.prop("api", Property::from(api))?;
    Ok(())
}

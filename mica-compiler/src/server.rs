//! The query-server loop
//!
//! `--server` answers editor queries over stdio, one JSON object per line.
//! The LSP transport itself lives outside the core; this loop exposes the
//! same operations against a checked module.

use crate::context::CompilerContext;
use crate::{namer, typer};
use mica_editor::TreeIndex;
use mica_syntax::{ByteOffset, ModuleTree};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::io::{BufRead, Write};
use tracing::info;

#[derive(Debug, Deserialize)]
struct Request {
    method: String,
    #[serde(default)]
    offset: Option<u32>,
    #[serde(default)]
    include_declaration: bool,
    #[serde(default)]
    command: Option<String>,
}

#[derive(Debug, Serialize)]
struct Response {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Response {
    fn ok(result: Json) -> Self {
        Response { ok: true, result: Some(result), error: None }
    }

    fn err(message: impl Into<String>) -> Self {
        Response { ok: false, result: None, error: Some(message.into()) }
    }
}

/// Serve queries for one module until stdin closes
pub fn serve(tree: &ModuleTree, input: impl BufRead, mut output: impl Write) -> std::io::Result<()> {
    let mut ctx = CompilerContext::new();
    namer::name_module(&mut ctx, tree);
    typer::type_module(&mut ctx, tree);
    let index = TreeIndex::build(tree);
    info!(module = %tree.name, "query server ready");

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => answer(&ctx, &index, tree, &request),
            Err(e) => Response::err(format!("malformed request: {}", e)),
        };
        serde_json::to_writer(&mut output, &response)?;
        output.write_all(b"\n")?;
        output.flush()?;
    }
    Ok(())
}

fn answer(
    ctx: &CompilerContext,
    index: &TreeIndex,
    tree: &ModuleTree,
    request: &Request,
) -> Response {
    let offset = request.offset.map(ByteOffset);

    match request.method.as_str() {
        "definition" => {
            let Some(offset) = offset else { return Response::err("missing offset") };
            json(mica_editor::definition(index, &ctx.db, offset))
        }
        "symbolAt" => {
            let Some(offset) = offset else { return Response::err("missing offset") };
            json(mica_editor::symbol_at(index, &ctx.db, offset))
        }
        "documentSymbols" => {
            json(mica_editor::document_symbols(tree, &ctx.db, &ctx.symbols))
        }
        "references" => {
            let Some(offset) = offset else { return Response::err("missing offset") };
            json(mica_editor::references(index, &ctx.db, offset, request.include_declaration))
        }
        "hover" => {
            let Some(offset) = offset else { return Response::err("missing offset") };
            json(mica_editor::hover(index, &ctx.db, &ctx.symbols, offset))
        }
        "codeActions" => {
            let Some(offset) = offset else { return Response::err("missing offset") };
            json(mica_editor::code_actions(index, &ctx.db, &ctx.symbols, offset))
        }
        "executeCommand" => match request.command.as_deref() {
            Some("inferredCaptures") => {
                json(mica_editor::inferred_captures(index, &ctx.db, &ctx.symbols))
            }
            other => Response::err(format!("unknown command {:?}", other)),
        },
        other => Response::err(format!("unknown method '{}'", other)),
    }
}

fn json<T: serde::Serialize>(value: T) -> Response {
    match serde_json::to_value(value) {
        Ok(j) => Response::ok(j),
        Err(e) => Response::err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mica_syntax::{Definition, IdDef, NodeId, Span, Stmts, Term};

    fn demo_tree() -> ModuleTree {
        ModuleTree::new(
            "demo",
            vec![Definition::Fun {
                id: NodeId::fresh(),
                span: Span::synthetic(),
                binder: IdDef::new("main"),
                tparams: vec![],
                vparams: vec![],
                bparams: vec![],
                ret: None,
                effects: vec![],
                body: Stmts::expr(Term::int(0)),
            }],
        )
    }

    #[test]
    fn test_serve_answers_document_symbols() {
        let tree = demo_tree();
        let input = b"{\"method\":\"documentSymbols\"}\n" as &[u8];
        let mut output = Vec::new();
        serve(&tree, input, &mut output).unwrap();

        let reply: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(reply["ok"], true);
        let names: Vec<&str> = reply["result"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"demo"));
        assert!(names.contains(&"main"));
    }

    #[test]
    fn test_serve_rejects_unknown_methods() {
        let tree = demo_tree();
        let input = b"{\"method\":\"frobnicate\"}\n" as &[u8];
        let mut output = Vec::new();
        serve(&tree, input, &mut output).unwrap();
        let reply: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(reply["ok"], false);
    }
}

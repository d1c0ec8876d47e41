/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Context;
use pump_cache::{Cache, CacheConfig, CoreEventKind};
use serde::Deserialize;
use std::env;

#[derive(Deserialize)]
struct Record {
    tag: u32,
    document: serde_json::Value,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let path = env::args().nth(1).unwrap_or_default();
    if path.trim().is_empty() {
        anyhow::bail!("usage: dev_replay <responses.jsonl> [config.json]");
    }
    let cfg = match env::args().nth(2) {
        Some(cfg_path) => {
            let raw = std::fs::read_to_string(&cfg_path)
                .with_context(|| format!("read {cfg_path}"))?;
            CacheConfig::from_json(&raw)?
        }
        None => CacheConfig::default().from_env_overrides(),
    };

    let raw = std::fs::read_to_string(path.trim()).with_context(|| format!("read {path}"))?;
    let mut cache = Cache::new(cfg);
    let mut events = cache.subscribe_events();

    for (n, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let rec: Record = serde_json::from_str(line).with_context(|| format!("line {}", n + 1))?;
        let tag = pump_cache::pump_protocol::ResponseTag::from_bits(rec.tag)
            .with_context(|| format!("line {}: unknown tag {:#x}", n + 1, rec.tag))?;
        match cache.submit_document(tag, &rec.document) {
            Ok(Some(key)) => println!("line={} resolved={key:?}", n + 1),
            Ok(None) => println!("line={} resolved=none", n + 1),
            Err(e) => println!("line={} error={e:#}", n + 1),
        }
        while let Ok(ev) = events.try_recv() {
            match (ev.kind, ev.request) {
                (CoreEventKind::Fetch, Some(req)) => {
                    println!("  fetch url={} tag={:#x}", req.url, req.tag.bits())
                }
                (kind, _) => println!("  event={kind:?}"),
            }
        }
    }

    println!("entities={}", cache.registry().len());
    Ok(())
}

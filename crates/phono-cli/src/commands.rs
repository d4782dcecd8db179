use anyhow::{bail, Context};
use colored::Colorize;
use phono_codec::{decode_key, KeyInfo};
use phono_model::{Object, PhonoConfig, Session};
use phono_query::{QuerySet, Value};
use phono_store::Namespace;
use phono_types::{Identifier, ObjectType};
use serde_json::json;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let format = cli.format;
    if let Command::Config = cli.command {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let mut session = Session::open(config).context("opening store")?;
    let result = match cli.command {
        Command::Stats => cmd_stats(&mut session, format),
        Command::Keys(args) => cmd_keys(&mut session, args, format),
        Command::Show(args) => cmd_show(&mut session, args, format),
        Command::Query(args) => cmd_query(&mut session, args, format),
        Command::Links(args) => cmd_links(&mut session, args, format),
        Command::Compact => session
            .store()
            .compact()
            .map(|()| println!("{} Journal compacted.", "✓".green()))
            .map_err(Into::into),
        Command::Config => Ok(()),
    };
    session.close()?;
    result
}

fn load_config(cli: &Cli) -> anyhow::Result<PhonoConfig> {
    let mut config = match &cli.config {
        Some(path) => PhonoConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => PhonoConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.store.path = Some(db.clone());
    }
    if config.store.path.is_none() {
        bail!("no store directory: pass --db or set store.path in the config");
    }
    debug!(path = ?config.store.path, "configuration loaded");
    Ok(config)
}

fn parse_type(name: &str) -> anyhow::Result<ObjectType> {
    name.parse::<ObjectType>()
        .with_context(|| format!("unknown object type '{name}'"))
}

fn describe(key: &[u8]) -> String {
    match decode_key(key) {
        Ok(KeyInfo::Segment(seg)) => {
            format!("{} @{}ms", seg.object_type, seg.offset_ms)
        }
        Ok(info) => info
            .object_type()
            .map(|t| t.name().to_string())
            .unwrap_or_else(|| "link".to_string()),
        Err(e) => format!("undecodable ({e})"),
    }
}

fn cmd_stats(session: &mut Session, format: OutputFormat) -> anyhow::Result<()> {
    let counts: Vec<(ObjectType, usize)> = session
        .type_index(true)?
        .iter()
        .map(|(t, keys)| (*t, keys.len()))
        .collect();
    let links = session.store().len(Namespace::SpeakerAudio)?;
    let stats = session.store().stats();

    if format == OutputFormat::Json {
        let types: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(t, n)| (t.name().to_string(), json!(n)))
            .collect();
        let out = json!({
            "types": types,
            "speaker_audio_links": links,
            "store": {
                "reads": stats.reads,
                "writes": stats.writes,
                "scans": stats.scans,
                "deletes": stats.deletes,
            },
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", "Records".bold());
    for (t, n) in &counts {
        println!("  {:<10} {}", t.name(), n.to_string().cyan());
    }
    println!("  {:<10} {}", "links", links.to_string().cyan());
    println!(
        "Store access: {} reads, {} writes, {} scans, {} deletes",
        stats.reads, stats.writes, stats.scans, stats.deletes
    );
    Ok(())
}

fn cmd_keys(session: &mut Session, args: KeysArgs, format: OutputFormat) -> anyhow::Result<()> {
    let keys = match &args.object_type {
        Some(name) => session.keys_of_type(parse_type(name)?)?,
        None => session.store().keys(Namespace::Main)?,
    };
    let total = keys.len();
    let shown: Vec<_> = keys.into_iter().take(args.limit).collect();

    if format == OutputFormat::Json {
        let rows: Vec<_> = shown
            .iter()
            .map(|k| json!({ "key": hex::encode(k), "kind": describe(k) }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&json!({ "total": total, "keys": rows }))?);
        return Ok(());
    }
    for key in &shown {
        println!("{}  {}", hex::encode(key).yellow(), describe(key).dimmed());
    }
    if total > shown.len() {
        println!("... {} more", total - shown.len());
    }
    Ok(())
}

fn cmd_show(session: &mut Session, args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let key = hex::decode(args.key.trim()).context("key is not hex")?;
    let id = session.load(&key)?;
    let children = if args.children {
        session.children(id)?
    } else {
        Vec::new()
    };
    let object = session.object(id)?;

    if format == OutputFormat::Json {
        let mut out = json!({
            "identifier": id.to_hex(),
            "type": object.object_type().name(),
            "summary": object.to_string(),
        });
        if let Object::Segment(seg) = object {
            out["label"] = json!(seg.label);
            out["start_ms"] = json!(seg.start_ms);
            out["end_ms"] = json!(seg.end_ms);
        }
        if args.children {
            out["children"] = json!(children.iter().map(|c| c.to_hex()).collect::<Vec<_>>());
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{} {}", object.object_type().name().bold(), id.to_hex().yellow());
    println!("  {object}");
    for child in children {
        println!("    {}", session.object(child)?);
    }
    Ok(())
}

/// `start__gte=100` becomes `("start__gte", Int(100))`. Values that parse
/// as numbers are numbers; `a,b` lists are used for `in` and `range`.
fn parse_lookup(raw: &str) -> anyhow::Result<(String, Value)> {
    let (lookup, value) = raw
        .split_once('=')
        .with_context(|| format!("expected lookup=value, got '{raw}'"))?;
    let wants_list = lookup.ends_with("__in") || lookup.ends_with("__range");
    let value = if wants_list {
        Value::List(value.split(',').map(scalar_value).collect())
    } else {
        scalar_value(value)
    };
    Ok((lookup.to_string(), value))
}

fn scalar_value(s: &str) -> Value {
    if let Ok(n) = s.parse::<i64>() {
        Value::Int(n)
    } else if let Ok(x) = s.parse::<f64>() {
        Value::Float(x)
    } else {
        Value::from(s)
    }
}

fn cmd_query(session: &mut Session, args: QueryArgs, format: OutputFormat) -> anyhow::Result<()> {
    let object_type = parse_type(&args.object_type)?;
    let filters = args
        .filter
        .iter()
        .map(|f| parse_lookup(f))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let excludes = args
        .exclude
        .iter()
        .map(|f| parse_lookup(f))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut qs = QuerySet::of_type(session, object_type)?
        .filter(filters)?
        .exclude(excludes)?
        .order_by(&args.order_by)?;
    debug!(queryset = %qs, "running query");
    let ids = qs.to_vec()?;
    let total = ids.len();
    let session = qs.session();

    if format == OutputFormat::Json {
        let rows = ids
            .iter()
            .take(args.limit)
            .map(|id| -> anyhow::Result<serde_json::Value> {
                Ok(json!({
                    "identifier": id.to_hex(),
                    "key": hex::encode(session.key_of(*id)?),
                    "summary": session.object(*id)?.to_string(),
                }))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        println!("{}", serde_json::to_string_pretty(&json!({ "total": total, "objects": rows }))?);
        return Ok(());
    }
    for id in ids.iter().take(args.limit) {
        println!("{}  {}", id.to_hex().yellow(), session.object(*id)?);
    }
    println!("{} {} matched", "✓".green(), total.to_string().bold());
    Ok(())
}

fn cmd_links(session: &mut Session, args: LinksArgs, format: OutputFormat) -> anyhow::Result<()> {
    let pairs: Vec<(Identifier, Identifier)> = match &args.identifier {
        Some(hex_id) => {
            let id = Identifier::from_hex(hex_id).context("identifier is not 16 hex digits")?;
            let audios = session.store().audios_of_speaker(id)?;
            let speakers = session.store().speakers_of_audio(id)?;
            audios
                .into_iter()
                .map(|a| (id, a))
                .chain(speakers.into_iter().map(|s| (s, id)))
                .collect()
        }
        None => session
            .store()
            .keys(Namespace::SpeakerAudio)?
            .iter()
            .filter_map(|k| match decode_key(k) {
                Ok(KeyInfo::SpeakerAudio { speaker_id, audio_id }) => Some((speaker_id, audio_id)),
                _ => None,
            })
            .collect(),
    };

    if format == OutputFormat::Json {
        let rows: Vec<_> = pairs
            .iter()
            .map(|(s, a)| json!({ "speaker": s.to_hex(), "audio": a.to_hex() }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if pairs.is_empty() {
        println!("No speaker-audio links.");
    }
    for (speaker, audio) in pairs {
        println!("{} → {}", speaker.to_hex().cyan(), audio.to_hex().yellow());
    }
    Ok(())
}

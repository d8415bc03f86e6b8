use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use kbrag_core::config::{resolve_with_base, Config, RetrievalConfig};
use kbrag_core::traits::{Paraphraser, RelevanceClassifier};
use kbrag_core::CorpusBuilder;
use kbrag_embed::default_embedder;
use kbrag_hybrid::{Collaborators, Jump, LexicalOverlapClassifier, OpenAiClient, QueryRequest, RetrievalPipeline};

const USAGE: &str = "Usage: kbrag <index|query|eval> [args...]
  kbrag index [corpus_dir]
  kbrag query \"<question>\" [--theme T] [--jump topic#section] [--offline] [--corpus DIR]
  kbrag eval <cases.yaml> [corpus_dir]";

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { eprintln!("{USAGE}"); std::process::exit(1); }
    let cmd = args.remove(0);
    (cmd, args)
}

/// `{query, expected_topic?, expected_file?}` regression case.
#[derive(Debug, Deserialize)]
struct EvalCase {
    query: String,
    #[serde(default)]
    expected_topic: Option<String>,
    #[serde(default)]
    expected_file: Option<String>,
}

#[derive(Debug, Serialize)]
struct EvalRow {
    query: String,
    top_chunk: Option<String>,
    topic_ok: Option<bool>,
    file_ok: Option<bool>,
    accepted: bool,
    confidence: f32,
    latency_ms: u64,
}

fn corpus_dir(arg: Option<&String>, retrieval: &RetrievalConfig) -> anyhow::Result<PathBuf> {
    let cwd = env::current_dir()?;
    Ok(match arg {
        Some(dir) => resolve_with_base(&cwd, dir),
        None => resolve_with_base(&cwd, &retrieval.corpus.dir),
    })
}

fn collaborators(retrieval: &RetrievalConfig, offline: bool) -> Collaborators {
    let mut collab = Collaborators { embedder: Some(default_embedder()), ..Collaborators::default() };
    let online = if offline { None } else {
        match OpenAiClient::from_env(&retrieval.llm) {
            Ok(client) => Some(Arc::new(client)),
            Err(err) => { tracing::info!(reason = %err, "LLM client disabled, running offline"); None }
        }
    };
    match online {
        Some(client) => {
            let paraphraser: Arc<dyn Paraphraser> = client.clone();
            let classifier: Arc<dyn RelevanceClassifier> = client;
            collab.paraphraser = Some(paraphraser);
            collab.classifier = Some(classifier);
        }
        None => collab.classifier = Some(Arc::new(LexicalOverlapClassifier)),
    }
    collab
}

async fn build_pipeline(dir: &Path, retrieval: RetrievalConfig, offline: bool) -> anyhow::Result<RetrievalPipeline> {
    let corpus = CorpusBuilder::new(&retrieval.corpus)?
        .build_from_dir(dir)
        .with_context(|| format!("building corpus from {}", dir.display()))?;
    for skipped in corpus.skipped() { tracing::info!(file = %skipped.file, reason = ?skipped.reason, "skipped"); }
    let collab = collaborators(&retrieval, offline);
    RetrievalPipeline::from_corpus(corpus, retrieval, collab).await
}

fn parse_jump(raw: &str) -> anyhow::Result<Jump> {
    let (topic, section_id) = raw.split_once('#').with_context(|| format!("--jump expects topic#section, got '{raw}'"))?;
    Ok(Jump { topic: topic.to_string(), section_id: section_id.to_string() })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let retrieval = config.retrieval()?;
    let (cmd, args) = parse_args();
    let rt = tokio::runtime::Runtime::new()?;
    match cmd.as_str() {
        "index" => {
            let dir = corpus_dir(args.first(), &retrieval)?;
            let pipeline = rt.block_on(build_pipeline(&dir, retrieval, true))?;
            let info = pipeline.snapshot().info();
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        "query" => {
            let mut query = None; let mut theme_hint = None; let mut jump = None; let mut offline = false; let mut dir_arg = None;
            let mut i = 0;
            while i < args.len() {
                match args[i].as_str() {
                    "--offline" => offline = true,
                    "--theme" => { i += 1; theme_hint = Some(args.get(i).context("--theme requires a topic")?.clone()); }
                    "--jump" => { i += 1; jump = Some(parse_jump(args.get(i).context("--jump requires topic#section")?)?); }
                    "--corpus" => { i += 1; dir_arg = Some(args.get(i).context("--corpus requires a directory")?.clone()); }
                    other if !other.starts_with("--") && query.is_none() => query = Some(other.to_string()),
                    other => { eprintln!("Unknown argument: {other}\n{USAGE}"); std::process::exit(1); }
                }
                i += 1;
            }
            let Some(query) = query else { eprintln!("{USAGE}"); std::process::exit(1) };
            let dir = corpus_dir(dir_arg.as_ref(), &retrieval)?;
            let result = rt.block_on(async {
                let pipeline = build_pipeline(&dir, retrieval, offline).await?;
                anyhow::Ok(pipeline.retrieve(&QueryRequest { query, theme_hint, jump }).await)
            })?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        "eval" => {
            let cases_path = args.first().map(PathBuf::from).unwrap_or_else(|| { eprintln!("{USAGE}"); std::process::exit(1) });
            let cases: Vec<EvalCase> = serde_yaml::from_str(&std::fs::read_to_string(&cases_path).with_context(|| format!("reading {}", cases_path.display()))?)
                .with_context(|| format!("parsing {}", cases_path.display()))?;
            let dir = corpus_dir(args.get(1), &retrieval)?;
            let rows = rt.block_on(async {
                let pipeline = build_pipeline(&dir, retrieval, true).await?;
                let mut rows = Vec::with_capacity(cases.len());
                for case in cases {
                    let start = Instant::now();
                    let result = pipeline.retrieve(&QueryRequest::new(case.query.clone())).await;
                    let top = result.passages.first();
                    rows.push(EvalRow {
                        top_chunk: top.map(|p| p.chunk_id.clone()),
                        topic_ok: case.expected_topic.as_ref().map(|t| top.is_some_and(|p| &p.topic == t)),
                        file_ok: case.expected_file.as_ref().map(|f| top.is_some_and(|p| &p.file == f)),
                        accepted: result.decision.accepted,
                        confidence: result.decision.confidence,
                        latency_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                        query: case.query,
                    });
                }
                anyhow::Ok(rows)
            })?;
            for row in &rows { println!("{}", serde_json::to_string(row)?); }
            let total = rows.len();
            let topic_hits = rows.iter().filter(|r| r.topic_ok == Some(true)).count();
            let topic_cases = rows.iter().filter(|r| r.topic_ok.is_some()).count();
            let file_hits = rows.iter().filter(|r| r.file_ok == Some(true)).count();
            let file_cases = rows.iter().filter(|r| r.file_ok.is_some()).count();
            let accepted = rows.iter().filter(|r| r.accepted).count();
            let avg_ms = if total == 0 { 0 } else { rows.iter().map(|r| r.latency_ms).sum::<u64>() / total as u64 };
            println!("\ncases: {total}  topic: {topic_hits}/{topic_cases}  file: {file_hits}/{file_cases}  accepted: {accepted}/{total}  avg latency: {avg_ms} ms");
        }
        _ => { eprintln!("Unknown command: {}\n{USAGE}", cmd); std::process::exit(1); }
    }
    Ok(())
}

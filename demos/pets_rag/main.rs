//! # Pets RAG Demo
//!
//! Builds an index over five short pet descriptions, runs a similarity
//! search, a batch retrieval, and finally answers a question through the
//! full retrieve → assemble → generate chain.
//!
//! With `--offline` the demo uses a keyword embedder and a scripted
//! generator, so it runs with **zero API keys**. Otherwise it reads
//! `OPENAI_API_KEY` and the `RAGCHAIN_*` variables (a `.env` file is
//! honoured) and calls the OpenAI API.
//!
//! Run: `cargo run -p ragchain-demos --example pets_rag -- --offline`

use std::sync::Arc;

use clap::Parser;
use ragchain::mock::{KeywordEmbeddingProvider, MockGenerator};
use ragchain::{
    Document, EmbeddingProvider, GenerationChain, GeneratorClient, OpenAIChatClient,
    OpenAIEmbeddingProvider, RagConfig, Retriever, VectorIndex,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pets_rag", about = "Retrieval-augmented answers over a tiny pets collection")]
struct Args {
    /// Use in-process mock models instead of the OpenAI API.
    #[arg(long)]
    offline: bool,

    /// Question answered by the chain.
    #[arg(long, default_value = "Tell me about cats")]
    question: String,

    /// Documents retrieved per question (overrides RAGCHAIN_TOP_K).
    #[arg(long)]
    top_k: Option<usize>,

    /// Sampling temperature (overrides RAGCHAIN_TEMPERATURE).
    #[arg(long)]
    temperature: Option<f32>,

    /// Maximum output tokens (overrides RAGCHAIN_MAX_TOKENS).
    #[arg(long)]
    max_tokens: Option<u32>,
}

impl Args {
    /// Command-line values take precedence over the matching variables.
    fn lookup(&self, key: &str) -> Option<String> {
        let flag = match key {
            "RAGCHAIN_TOP_K" => self.top_k.map(|v| v.to_string()),
            "RAGCHAIN_TEMPERATURE" => self.temperature.map(|v| v.to_string()),
            "RAGCHAIN_MAX_TOKENS" => self.max_tokens.map(|v| v.to_string()),
            _ => None,
        };
        flag.or_else(|| std::env::var(key).ok())
    }
}

fn pet_documents() -> Vec<Document> {
    vec![
        Document::new("Dogs are wonderful partners, known for their loyalty and friendliness.")
            .with_source("mammal-pets-doc"),
        Document::new("Cats are independent pets that often enjoy having a space of their own.")
            .with_source("mammal-pets-doc"),
        Document::new("Goldfish are popular with beginners because they are relatively easy to keep.")
            .with_source("fish-pets-doc"),
        Document::new("Parrots are clever birds that can mimic human speech.")
            .with_source("bird-pets-doc"),
        Document::new("Rabbits are social animals and need plenty of room to hop around.")
            .with_source("mammal-pets-doc"),
    ]
}

fn print_documents(documents: &[Document]) {
    for doc in documents {
        println!("- {} (source: {})", doc.content, doc.source().unwrap_or("unknown"));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    let config = RagConfig::from_lookup(|key| args.lookup(key))?;
    info!(?config, offline = args.offline, "starting");

    // -- 1. Model clients ---------------------------------------------------
    let (embedder, generator): (Arc<dyn EmbeddingProvider>, Arc<dyn GeneratorClient>) =
        if args.offline {
            (
                Arc::new(KeywordEmbeddingProvider::new([
                    vec!["dog"],
                    vec!["cat"],
                    vec!["fish", "goldfish"],
                    vec!["parrot", "bird"],
                    vec!["rabbit"],
                ])),
                Arc::new(MockGenerator::new(
                    "(offline) The context says cats are independent and like a space of their own.",
                )),
            )
        } else {
            (
                Arc::new(OpenAIEmbeddingProvider::from_config(&config)?),
                Arc::new(OpenAIChatClient::from_config(&config)?),
            )
        };

    // -- 2. Build the index -------------------------------------------------
    let index = Arc::new(
        VectorIndex::builder()
            .embedder(embedder)
            .embed_timeout(config.embed_timeout)
            .max_concurrency(config.max_concurrency)
            .build()?,
    );
    let ids = index.insert(&pet_documents()).await?;
    println!("Indexed {} documents.\n", ids.len());

    // -- 3. Similarity search -----------------------------------------------
    println!("Similarity search for 'cat':");
    let results = index.query("cat", 4).await?;
    for result in &results {
        println!(
            "- [score={:.4}] {} (source: {})",
            result.score,
            result.document.content,
            result.document.source().unwrap_or("unknown"),
        );
    }
    println!();

    // -- 4. Batch retrieval -------------------------------------------------
    let retriever = Retriever::new(Arc::clone(&index), config.top_k)?;
    let queries = ["cat", "fish"];
    println!("Retriever batch results (k={}):", retriever.k());
    for (query, documents) in queries.iter().zip(retriever.retrieve_batch(&queries).await?) {
        println!("Query: {query}");
        print_documents(&documents);
    }
    println!();

    // -- 5. Answer through the chain ----------------------------------------
    let chain =
        GenerationChain::builder().config(&config).retriever(retriever).generator(generator).build()?;

    println!("Chain answer for '{}':", args.question);
    let answer = chain.answer(&args.question).await?;
    if answer.empty_context {
        println!("(no documents matched; the answer is not grounded)");
    }
    println!("{}", answer.text);

    Ok(())
}

//! End-to-end tests for the retrieve → assemble → generate chain.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{pet_documents, pet_embedder};
use ragchain::mock::{MockEmbeddingProvider, MockGenerator, RecordingObserver};
use ragchain::{
    ChainStage, EmbeddingProvider, GenerationChain, GenerationParams, PromptTemplate, RagConfig,
    RagError, Retriever, VectorIndex, assemble,
};

async fn index_with(
    embedder: Arc<dyn EmbeddingProvider>,
    documents: &[ragchain::Document],
) -> Arc<VectorIndex> {
    let index = Arc::new(VectorIndex::new(embedder));
    index.insert(documents).await.unwrap();
    index
}

async fn pets_index() -> Arc<VectorIndex> {
    index_with(Arc::new(pet_embedder()), &pet_documents()).await
}

#[tokio::test]
async fn answers_about_cats_using_only_the_cat_document() {
    let index = pets_index().await;
    let generator = Arc::new(MockGenerator::new("Cats are independent and like their own space."));
    let observer = Arc::new(RecordingObserver::new());
    let chain = GenerationChain::builder()
        .retriever(Retriever::new(index, 1).unwrap())
        .generator(generator.clone())
        .observer(observer.clone())
        .build()
        .unwrap();

    let answer = chain.answer("Tell me about cats").await.unwrap();

    assert!(!answer.text.is_empty());
    assert!(!answer.empty_context);
    let cat = pet_documents().remove(1);
    assert_eq!(answer.context, vec![cat.clone()]);

    let prompts = observer.prompts();
    assert_eq!(prompts.len(), 1);
    let expected = assemble(&PromptTemplate::default(), &[cat], "Tell me about cats");
    assert_eq!(prompts[0], expected);
    assert_eq!(answer.prompt, expected);
    for other in pet_documents().iter().filter(|d| !d.content.starts_with("Cats")) {
        assert!(!prompts[0].as_str().contains(&other.content));
    }

    assert_eq!(generator.requests().len(), 1);
    assert_eq!(generator.requests()[0].prompt, expected);
}

#[tokio::test]
async fn stage_transitions_follow_the_happy_path() {
    let observer = Arc::new(RecordingObserver::new());
    let chain = GenerationChain::builder()
        .retriever(Retriever::new(pets_index().await, 1).unwrap())
        .generator(Arc::new(MockGenerator::new("ok")))
        .observer(observer.clone())
        .build()
        .unwrap();

    chain.answer("cat").await.unwrap();

    assert_eq!(
        observer.transitions(),
        vec![
            (ChainStage::Idle, ChainStage::Retrieving),
            (ChainStage::Retrieving, ChainStage::Assembling),
            (ChainStage::Assembling, ChainStage::Generating),
            (ChainStage::Generating, ChainStage::Done),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn slow_generation_times_out_in_generating_stage() {
    let observer = Arc::new(RecordingObserver::new());
    let chain = GenerationChain::builder()
        .retriever(Retriever::new(pets_index().await, 1).unwrap())
        .generator(Arc::new(MockGenerator::new("too late").with_latency(Duration::from_secs(120))))
        .generation_timeout(Duration::from_secs(2))
        .observer(observer.clone())
        .build()
        .unwrap();

    let err = chain.answer("Tell me about cats").await.unwrap_err();

    assert_eq!(err.stage, ChainStage::Generating);
    assert!(matches!(
        err.source,
        RagError::Timeout { operation: "generation", after } if after == Duration::from_secs(2)
    ));
    assert_eq!(observer.transitions().last(), Some(&(ChainStage::Generating, ChainStage::Failed)));
}

#[tokio::test]
async fn generation_failure_is_tagged_and_not_swallowed() {
    let chain = GenerationChain::builder()
        .retriever(Retriever::new(pets_index().await, 1).unwrap())
        .generator(Arc::new(MockGenerator::new("unused").failing("model overloaded")))
        .build()
        .unwrap();

    let err = chain.answer("cat").await.unwrap_err();

    assert_eq!(err.stage, ChainStage::Generating);
    assert!(matches!(
        err.source,
        RagError::Generation { ref message, .. } if message == "model overloaded"
    ));
    assert!(err.to_string().contains("generating"));
}

#[tokio::test]
async fn embedding_failure_is_tagged_retrieving() {
    let embedder = Arc::new(MockEmbeddingProvider::new(16).failing_on("boom"));
    let index = index_with(embedder, &pet_documents()).await;
    let generator = Arc::new(MockGenerator::new("unused"));
    let chain = GenerationChain::builder()
        .retriever(Retriever::new(index, 1).unwrap())
        .generator(generator.clone())
        .build()
        .unwrap();

    let err = chain.answer("boom").await.unwrap_err();

    assert_eq!(err.stage, ChainStage::Retrieving);
    assert!(matches!(err.source, RagError::Embedding { .. }));
    assert!(generator.requests().is_empty());
}

#[tokio::test]
async fn empty_index_degrades_to_ungrounded_answer() {
    let index = Arc::new(VectorIndex::new(Arc::new(pet_embedder())));
    let generator = Arc::new(MockGenerator::new("From general knowledge: cats purr."));
    let chain = GenerationChain::builder()
        .retriever(Retriever::new(index, 1).unwrap())
        .generator(generator.clone())
        .build()
        .unwrap();

    let answer = chain.answer("Tell me about cats").await.unwrap();

    assert!(answer.empty_context);
    assert!(answer.context.is_empty());
    assert_eq!(answer.text, "From general knowledge: cats purr.");
    assert_eq!(generator.requests().len(), 1);
}

#[tokio::test]
async fn config_parameters_pass_through_to_generator() {
    let config = RagConfig::builder()
        .temperature(0.1)
        .max_tokens(100)
        .template("Use only:\n{context}\nQ: {question}")
        .build()
        .unwrap();
    let generator = Arc::new(MockGenerator::new("ok"));
    let chain = GenerationChain::builder()
        .config(&config)
        .retriever(Retriever::new(pets_index().await, config.top_k).unwrap())
        .generator(generator.clone())
        .build()
        .unwrap();

    let answer = chain.answer("fish").await.unwrap();

    let request = &generator.requests()[0];
    assert_eq!(request.params, GenerationParams { temperature: Some(0.1), max_tokens: Some(100) });
    assert!(answer.prompt.as_str().starts_with("Use only:\nGoldfish"));
    assert!(answer.prompt.as_str().ends_with("Q: fish"));
}

#[tokio::test]
async fn answer_batch_preserves_order() {
    let chain = GenerationChain::builder()
        .retriever(Retriever::new(pets_index().await, 1).unwrap())
        .generator(Arc::new(MockGenerator::new("ok")))
        .max_concurrency(2)
        .build()
        .unwrap();

    let answers = chain.answer_batch(&["cat", "fish", "parrot"]).await;

    let sources: Vec<Option<String>> = answers
        .into_iter()
        .map(|a| a.unwrap().context[0].source().map(str::to_string))
        .collect();
    assert_eq!(
        sources,
        vec![
            Some("mammal-pets-doc".to_string()),
            Some("fish-pets-doc".to_string()),
            Some("bird-pets-doc".to_string()),
        ]
    );
}

#[tokio::test]
async fn repeated_answers_use_identical_prompts() {
    let observer = Arc::new(RecordingObserver::new());
    let chain = GenerationChain::builder()
        .retriever(Retriever::new(pets_index().await, 2).unwrap())
        .generator(Arc::new(MockGenerator::new("ok")))
        .observer(observer.clone())
        .build()
        .unwrap();

    chain.answer("rabbit").await.unwrap();
    chain.answer("rabbit").await.unwrap();

    let prompts = observer.prompts();
    assert_eq!(prompts[0], prompts[1]);
}

#[test]
fn build_rejects_zero_timeout() {
    let index = Arc::new(VectorIndex::new(Arc::new(pet_embedder())));
    let result = GenerationChain::builder()
        .retriever(Retriever::new(index, 1).unwrap())
        .generator(Arc::new(MockGenerator::new("ok")))
        .generation_timeout(Duration::ZERO)
        .build();
    assert!(matches!(result, Err(RagError::Config(_))));
}

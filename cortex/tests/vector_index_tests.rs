// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Vector index tests: fallback embedding, cosine similarity and ranking.

use brain_cortex::domain::VectorDocument;
use brain_cortex::infrastructure::embedding_client::{fallback_embedding, FALLBACK_DIMENSIONS};
use brain_cortex::infrastructure::vector_store::cosine_similarity;
use brain_cortex::infrastructure::{InMemoryVectorRepository, OllamaEmbeddingClient, VectorRepository};
use std::sync::Arc;

#[test]
fn test_fallback_embedding_is_deterministic() {
    let text = "The quick brown fox jumps over the lazy dog";
    let first = fallback_embedding(text);
    let second = fallback_embedding(text);

    assert_eq!(first.len(), FALLBACK_DIMENSIONS);
    let first_bits: Vec<u32> = first.iter().map(|x| x.to_bits()).collect();
    let second_bits: Vec<u32> = second.iter().map(|x| x.to_bits()).collect();
    assert_eq!(first_bits, second_bits);
}

#[test]
fn test_cosine_symmetry_and_self_similarity() {
    let a = fallback_embedding("alpha beta beta gamma");
    let b = fallback_embedding("delta alpha");

    assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    assert_eq!(cosine_similarity(&a, &[0.0; 3]), 0.0);
}

#[tokio::test]
async fn test_search_limit_and_ordering() {
    let index = InMemoryVectorRepository::new();
    index
        .add_documents(vec![
            VectorDocument::new("exact", "graph store design"),
            VectorDocument::new("partial", "graph store"),
            VectorDocument::new("other", "apple banana cherry durian elderberry"),
        ])
        .await
        .unwrap();

    let hits = index.search("graph store design", 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "exact");
    assert_eq!(hits[1].id, "partial");
    assert!(hits[0].similarity >= hits[1].similarity);
}

#[tokio::test]
async fn test_index_with_ollama_embeddings() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/embeddings")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"embedding": [0.6, 0.8, 0.0]}"#)
        .expect(2)
        .create_async()
        .await;

    let index = InMemoryVectorRepository::with_embedder(Arc::new(OllamaEmbeddingClient::new(
        server.url(),
        "nomic-embed-text",
    )));
    index
        .add_document(VectorDocument::new("note-1", "anything"))
        .await
        .unwrap();
    let hits = index.search("anything at all", 5).await.unwrap();

    mock.assert_async().await;
    assert_eq!(hits.len(), 1);
    assert!((hits[0].similarity - 1.0).abs() < 1e-6);
}

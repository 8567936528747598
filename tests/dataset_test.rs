use std::fs;

use lurelens::Corpus;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

#[test]
fn test_load_corpus_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("corpus.jsonl");
    fs::write(
        &path,
        concat!(
            "{\"dialogue\": [{\"speaker\": \"scammer\", \"text\": \"Text me at lizzy@fake.example instead\"}]}\n",
            "{broken\n",
            "{\"message\": \"Call me on +44 7700 900123, my camera is broken\"}\n",
        ),
    )
    .unwrap();

    let corpus = Corpus::load(&path).unwrap();
    assert_eq!(corpus.record_count(), 2);
    assert_eq!(corpus.source(), Some(path.as_path()));
    assert_eq!(
        corpus.examples(),
        &[
            "Scammer: Text me at [REDACTED_EMAIL] instead".to_string(),
            "Call me on [REDACTED_PHONE], my camera is broken".to_string(),
        ]
    );
}

#[test]
fn test_missing_corpus_uses_builtin_examples() {
    let temp_dir = TempDir::new().unwrap();
    let corpus = Corpus::load(temp_dir.path().join("missing.jsonl")).unwrap();
    assert!(corpus.source().is_none());
    assert_eq!(corpus.record_count(), 0);
    assert!(!corpus.examples().is_empty());
    assert!(corpus.examples().iter().all(|e| e.contains("[SIMULATION]")));
}

#[test]
fn test_bundled_corpus_loads() {
    let corpus = Corpus::load("data/scc_clean.jsonl").unwrap();
    assert_eq!(corpus.record_count(), 4);
    assert_eq!(corpus.examples().len(), 4);

    let mut rng = StdRng::seed_from_u64(42);
    let sample = corpus.sample_style_text(&mut rng);
    assert!(corpus.examples().iter().any(|e| e == sample.as_str()));
}

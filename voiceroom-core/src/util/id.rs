use rand::{distributions::Alphanumeric, thread_rng, Rng};

/// The length of generated document ids
const DOCUMENT_ID_LENGTH: usize = 20;

/// Generates an id for a new document, the way hosted document stores do.
pub fn document_id() -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(DOCUMENT_ID_LENGTH)
        .collect()
}

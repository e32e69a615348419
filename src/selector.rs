//! Pure decision procedure turning a Registry answer into a single chosen
//! Backend, honouring stickiness and retrying on stale IDs (§4.1).

use crate::registry::{Backend, Registry};
use rand::Rng;

/// Bounds the Selector's restart loop. The original spec leaves this
/// unbounded ("live as long as some eligible backend exists"); this
/// implementation caps it so a pathological eviction storm degrades to a
/// `503` instead of spinning the request task forever — see REDESIGN FLAGS
/// and DESIGN.md.
const MAX_RESTARTS: usize = 1000;

/// Outcome of a selection attempt.
pub enum Selection {
    /// A backend was chosen.
    Found(Backend),
    /// The eligible set was empty — no backend exists for this request.
    NotFound,
    /// The eligible set was repeatedly non-empty but every resolve raced
    /// away within `MAX_RESTARTS` attempts.
    Unavailable,
}

/// Run the selection algorithm against `registry` for a request whose
/// routing fingerprint is `fingerprint` and whose sticky cookie value (if
/// the client sent one) is `sticky`.
pub async fn select(
    registry: &dyn Registry,
    fingerprint: &str,
    sticky: Option<&str>,
) -> Selection {
    for _ in 0..MAX_RESTARTS {
        let ids = registry.lookup_ids(fingerprint).await;
        if ids.is_empty() {
            return Selection::NotFound;
        }

        if ids.len() == 1 {
            match registry.lookup_by_id(&ids[0]).await {
                Some(backend) => return Selection::Found(backend),
                None => continue, // raced away between lookup_ids and lookup_by_id
            }
        }

        if let Some(sticky_id) = sticky {
            let resolved = registry.lookup_by_ids(&ids).await;
            if let Some(backend) = resolved
                .into_iter()
                .find(|b| b.private_instance_id == sticky_id)
            {
                return Selection::Found(backend);
            }
            // Stale sticky value — fall through to random pick below.
        }

        let pick = rand::thread_rng().gen_range(0..ids.len());
        match registry.lookup_by_id(&ids[pick]).await {
            Some(backend) => return Selection::Found(backend),
            None => continue,
        }
    }

    Selection::Unavailable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BackendId, InMemoryRegistry};
    use std::collections::HashMap;

    fn backend(id: &str, addr: &str, private_id: &str) -> Backend {
        Backend {
            id: BackendId::from(id),
            address: addr.to_string(),
            private_instance_id: private_id.to_string(),
        }
    }

    #[tokio::test]
    async fn empty_eligible_set_is_not_found() {
        let registry = InMemoryRegistry::new();
        assert!(matches!(
            select(&registry, "nope.example", None).await,
            Selection::NotFound
        ));
    }

    #[tokio::test]
    async fn single_eligible_id_resolves_directly() {
        let registry = InMemoryRegistry::new();
        let b = backend("b1", "10.0.0.1:1", "i-1");
        registry.upsert("app.example", b.clone());

        match select(&registry, "app.example", None).await {
            Selection::Found(found) => assert_eq!(found, b),
            _ => panic!("expected Found"),
        }
    }

    #[tokio::test]
    async fn sticky_hit_is_deterministic() {
        let registry = InMemoryRegistry::new();
        let a = backend("a", "10.0.0.1:1", "i-1");
        let b = backend("b", "10.0.0.2:2", "i-2");
        registry.upsert("app.example", a);
        registry.upsert("app.example", b.clone());

        for _ in 0..100 {
            match select(&registry, "app.example", Some("i-2")).await {
                Selection::Found(found) => assert_eq!(found.id, b.id),
                _ => panic!("expected Found"),
            }
        }
    }

    #[tokio::test]
    async fn stale_sticky_falls_back_to_random_over_remaining_set() {
        let registry = InMemoryRegistry::new();
        let a = backend("a", "10.0.0.1:1", "i-1");
        registry.upsert("app.example", a.clone());

        match select(&registry, "app.example", Some("i-9-does-not-exist")).await {
            Selection::Found(found) => assert_eq!(found, a),
            _ => panic!("expected Found"),
        }
    }

    #[tokio::test]
    async fn random_pick_is_roughly_uniform() {
        let registry = InMemoryRegistry::new();
        let a = backend("a", "10.0.0.1:1", "i-1");
        let b = backend("b", "10.0.0.2:2", "i-2");
        registry.upsert("app.example", a.clone());
        registry.upsert("app.example", b.clone());

        let mut counts: HashMap<BackendId, usize> = HashMap::new();
        for _ in 0..2000 {
            if let Selection::Found(found) = select(&registry, "app.example", None).await {
                *counts.entry(found.id).or_insert(0) += 1;
            }
        }
        let a_count = *counts.get(&a.id).unwrap_or(&0);
        let b_count = *counts.get(&b.id).unwrap_or(&0);
        assert!((700..1300).contains(&a_count), "a count: {}", a_count);
        assert!((700..1300).contains(&b_count), "b count: {}", b_count);
    }
}

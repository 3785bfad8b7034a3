use crate::metrics::vector::{InstantVector, Vector};

// Vector selector is the part in prometheus query that selects the metrics
// Example: (sum by (pod) (container_memory_usage_bytes))
// container_memory_usage_bytes is the vector selector.
// We require all vector selectors to have a job label, for example
// (sum by (pod) (container_memory_usage_bytes{job="kubelet"})).
// Without it a selector can reach series of any exporter, including ones
// no permission policy exists for.
fn validate_vector_selector(vector: &InstantVector) -> bool {
    vector.has_label_matcher("job")
}

/// True when every selector of the expression, on both sides of every
/// binary operation, carries a `job` label matcher.
pub fn all_vectors_have_job_matcher(vector: &Vector) -> bool {
    match vector {
        Vector::Instant(instant) => validate_vector_selector(instant),
        Vector::Match(vector_match) => {
            all_vectors_have_job_matcher(&vector_match.left)
                && all_vectors_have_job_matcher(&vector_match.right)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::parser::parse_query;

    fn validate(query: &str) -> bool {
        let vector = parse_query(query).unwrap().unwrap();
        all_vectors_have_job_matcher(&vector)
    }

    #[test]
    fn test_selector_with_job() {
        assert!(validate(r#"node_cpu_seconds_total{job="node-exporter"}"#));
        assert!(validate(r#"rate(node_cpu_seconds_total{job=~"node.*"}[5m])"#));
    }

    #[test]
    fn test_selector_without_job() {
        assert!(!validate("node_cpu_seconds_total"));
        assert!(!validate(r#"node_cpu_seconds_total{instance="x"}"#));
    }

    #[test]
    fn test_every_side_of_a_match_is_checked() {
        assert!(validate(
            r#"a{job="kubelet"} + on(pod) b{job="kube-state-metrics"}"#
        ));
        assert!(!validate(r#"a{job="kubelet"} + on(pod) b"#));
        assert!(!validate(r#"a / (b{job="kubelet"} - c)"#));
    }
}

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use super::{SampleBundle, SampleRange};
use crate::convert::FormatConverter;
use crate::error::{ConversionError, DatasetError};
use crate::evaluator::{Evaluator, TemplateRef};

/// Drives evaluation and conversion over a sample range.
#[derive(Clone)]
pub struct SampleProducer {
    evaluator: Arc<dyn Evaluator>,
    converter: Arc<dyn FormatConverter>,
}

impl SampleProducer {
    pub fn new(evaluator: Arc<dyn Evaluator>, converter: Arc<dyn FormatConverter>) -> Self {
        Self {
            evaluator,
            converter,
        }
    }

    /// Produces a single bundle.
    pub async fn produce_one(
        &self,
        template: &TemplateRef,
        sample_number: u32,
    ) -> Result<SampleBundle, DatasetError> {
        produce_bundle(
            self.evaluator.as_ref(),
            self.converter.as_ref(),
            template,
            sample_number,
        )
        .await
    }

    /// Yields one bundle per sample number, in ascending order.
    ///
    /// Samples are evaluated one at a time. The stream ends after the first
    /// error, which is yielded as its last item.
    pub fn produce_samples(
        &self,
        template: TemplateRef,
        range: SampleRange,
    ) -> impl Stream<Item = Result<SampleBundle, DatasetError>> + Send + 'static {
        let evaluator = Arc::clone(&self.evaluator);
        let converter = Arc::clone(&self.converter);

        info!(template = %template.name, range = %range, "Producing samples");
        async_stream::try_stream! {
            for sample_number in range {
                let bundle = produce_bundle(
                    evaluator.as_ref(),
                    converter.as_ref(),
                    &template,
                    sample_number,
                )
                .await?;
                yield bundle;
            }
        }
    }

    /// Like [`produce_samples`](Self::produce_samples) but keeps up to
    /// `concurrency` evaluations in flight.
    ///
    /// Output order still follows sample number. When a sample fails, the
    /// in-flight evaluations behind it are dropped.
    pub fn produce_concurrent(
        &self,
        template: TemplateRef,
        range: SampleRange,
        concurrency: usize,
    ) -> impl Stream<Item = Result<SampleBundle, DatasetError>> + Send + 'static {
        let evaluator = Arc::clone(&self.evaluator);
        let converter = Arc::clone(&self.converter);
        let concurrency = concurrency.max(1);

        info!(
            template = %template.name,
            range = %range,
            concurrency,
            "Producing samples concurrently"
        );
        async_stream::stream! {
            let mut pending = futures::stream::iter(range)
                .map(move |sample_number| {
                    let evaluator = Arc::clone(&evaluator);
                    let converter = Arc::clone(&converter);
                    let template = template.clone();
                    async move {
                        produce_bundle(
                            evaluator.as_ref(),
                            converter.as_ref(),
                            &template,
                            sample_number,
                        )
                        .await
                    }
                })
                .buffered(concurrency)
                .boxed();

            while let Some(result) = pending.next().await {
                let failed = result.is_err();
                yield result;
                if failed {
                    break;
                }
            }
        }
    }
}

async fn produce_bundle(
    evaluator: &dyn Evaluator,
    converter: &dyn FormatConverter,
    template: &TemplateRef,
    sample_number: u32,
) -> Result<SampleBundle, DatasetError> {
    let circuit_graph = evaluator
        .evaluate(template, sample_number)
        .await
        .map_err(|source| DatasetError::Evaluation {
            sample_number,
            source,
        })?;

    let conversion = |source: ConversionError| DatasetError::Conversion {
        sample_number,
        source,
    };
    let routing_graph = converter
        .to_routing_graph(&circuit_graph)
        .map_err(conversion)?;
    let board_description = converter
        .to_board_description(&circuit_graph)
        .map_err(conversion)?;

    let preview_svg = match converter.to_preview_image(&circuit_graph) {
        Ok(svg) => Some(svg),
        Err(e) => {
            warn!(sample_number, error = %e, "Preview rendering failed, sample degraded");
            None
        }
    };

    debug!(
        sample_number,
        elements = circuit_graph.len(),
        degraded = preview_svg.is_none(),
        "Sample produced"
    );
    Ok(SampleBundle {
        sample_number,
        circuit_graph,
        routing_graph,
        board_description,
        preview_svg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitGraph;
    use crate::convert::fixtures::two_pad_circuit;
    use crate::convert::CircuitConverter;
    use crate::error::EvaluationError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Returns the fixture circuit, failing on selected sample numbers.
    struct FakeEvaluator {
        fail_on: HashSet<u32>,
        calls: Mutex<Vec<u32>>,
        delay_ms: fn(u32) -> u64,
    }

    impl FakeEvaluator {
        fn new(fail_on: &[u32]) -> Self {
            Self {
                fail_on: fail_on.iter().copied().collect(),
                calls: Mutex::new(Vec::new()),
                delay_ms: |_| 0,
            }
        }

        fn calls(&self) -> Vec<u32> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Evaluator for FakeEvaluator {
        async fn evaluate(
            &self,
            _template: &TemplateRef,
            sample_number: u32,
        ) -> Result<CircuitGraph, EvaluationError> {
            self.calls.lock().unwrap().push(sample_number);
            let delay = (self.delay_ms)(sample_number);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.fail_on.contains(&sample_number) {
                return Err(EvaluationError::Execution {
                    code: 1,
                    stderr: format!("sample {} exploded", sample_number),
                });
            }
            Ok(two_pad_circuit())
        }
    }

    struct NoPreviewConverter;

    impl FormatConverter for NoPreviewConverter {
        fn to_routing_graph(&self, graph: &CircuitGraph) -> Result<Value, ConversionError> {
            CircuitConverter::default().to_routing_graph(graph)
        }

        fn to_board_description(&self, graph: &CircuitGraph) -> Result<String, ConversionError> {
            CircuitConverter::default().to_board_description(graph)
        }

        fn to_preview_image(&self, _graph: &CircuitGraph) -> Result<String, ConversionError> {
            Err(ConversionError::UnsupportedPreview("no renderer".into()))
        }
    }

    fn keyboard() -> TemplateRef {
        TemplateRef::new("keyboard", "@tsci/seveibar.keyboard-sample")
    }

    fn producer(evaluator: Arc<FakeEvaluator>) -> SampleProducer {
        SampleProducer::new(evaluator, Arc::new(CircuitConverter::default()))
    }

    #[tokio::test]
    async fn test_produces_range_in_order() {
        let evaluator = Arc::new(FakeEvaluator::new(&[]));
        let range = SampleRange::new(1, 3).unwrap();

        let bundles: Vec<_> = producer(Arc::clone(&evaluator))
            .produce_samples(keyboard(), range)
            .collect()
            .await;

        let numbers: Vec<u32> = bundles
            .into_iter()
            .map(|b| b.unwrap().sample_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(evaluator.calls(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_stops_after_first_failure() {
        let evaluator = Arc::new(FakeEvaluator::new(&[2]));
        let range = SampleRange::new(1, 3).unwrap();

        let results: Vec<_> = producer(Arc::clone(&evaluator))
            .produce_samples(keyboard(), range)
            .collect()
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().sample_number, 1);
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(err.sample_number(), Some(2));
        assert!(matches!(err, DatasetError::Evaluation { .. }));
        assert_eq!(evaluator.calls(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_preview_failure_degrades_sample() {
        let producer = SampleProducer::new(
            Arc::new(FakeEvaluator::new(&[])),
            Arc::new(NoPreviewConverter),
        );

        let bundle = producer.produce_one(&keyboard(), 4).await.unwrap();
        assert_eq!(bundle.sample_number, 4);
        assert!(bundle.is_degraded());
        assert_eq!(bundle.artifacts().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_keeps_sample_order() {
        let mut evaluator = FakeEvaluator::new(&[]);
        // Earlier samples finish last.
        evaluator.delay_ms = |n| 40 - 10 * u64::from(n);
        let range = SampleRange::new(1, 3).unwrap();

        let numbers: Vec<u32> = producer(Arc::new(evaluator))
            .produce_concurrent(keyboard(), range, 3)
            .map(|r| r.unwrap().sample_number)
            .collect()
            .await;
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_concurrent_stops_after_first_failure() {
        let range = SampleRange::new(1, 5).unwrap();
        let results: Vec<_> = producer(Arc::new(FakeEvaluator::new(&[3])))
            .produce_concurrent(keyboard(), range, 2)
            .collect()
            .await;

        assert_eq!(results.len(), 3);
        assert!(results[..2].iter().all(Result::is_ok));
        assert_eq!(results[2].as_ref().unwrap_err().sample_number(), Some(3));
    }
}

//! The long-lived runtime object tying the pieces together.
//!
//! A [`Weaver`] owns the configuration, the installed instrumentations, the
//! executor rules, the decorator registry, the task state table and the
//! export queue. Nothing here is process-global: tests construct isolated
//! instances and two weavers never share state.

use crate::advice::InstrumentationSet;
use crate::concurrent::{ExecutorRegistry, StateTable, Task, TaskPropagator};
use crate::config::Config;
use crate::context::Context;
use crate::decorator::{Decorator, DecoratorRegistry};
use crate::export::{ExportQueue, JsonLogExporter, SpanExporter};
use crate::propagation::{CarrierExtractor, CarrierInjector, CompositeCodec, PropagationCodec};
use crate::span::{Span, SpanBuilder};
use crate::util::{IdSource, OsIdSource};
use std::sync::Arc;

/// The assembled instrumentation runtime.
#[derive(Debug)]
pub struct Weaver {
    config: Config,
    instrumentations: InstrumentationSet,
    executors: Arc<ExecutorRegistry>,
    decorators: DecoratorRegistry,
    propagator: TaskPropagator,
    codec: CompositeCodec,
    export_queue: Arc<ExportQueue>,
    exporter: Arc<dyn SpanExporter>,
    id_source: Arc<dyn IdSource>,
}

impl Weaver {
    /// Starts building a weaver.
    #[must_use]
    pub fn builder() -> WeaverBuilder {
        WeaverBuilder::new()
    }

    /// Returns the frozen configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the installed instrumentations.
    #[must_use]
    pub fn instrumentations(&self) -> &InstrumentationSet {
        &self.instrumentations
    }

    /// Returns the executor wrapping rules.
    #[must_use]
    pub fn executors(&self) -> &Arc<ExecutorRegistry> {
        &self.executors
    }

    /// Returns the decorator registry.
    #[must_use]
    pub fn decorators(&self) -> &DecoratorRegistry {
        &self.decorators
    }

    /// Returns the task propagator for executor submissions.
    #[must_use]
    pub fn propagator(&self) -> &TaskPropagator {
        &self.propagator
    }

    /// Returns the export queue ended spans are offered to.
    #[must_use]
    pub fn export_queue(&self) -> &Arc<ExportQueue> {
        &self.export_queue
    }

    /// Starts building a span wired to this weaver's id source and, when
    /// tracing is enabled, its export queue.
    #[must_use]
    pub fn span(&self, name: impl Into<String>) -> SpanBuilder {
        let builder = Span::builder(name).with_id_source(Arc::clone(&self.id_source));
        if self.config.trace_enabled() {
            builder.with_sink(Arc::clone(&self.export_queue))
        } else {
            builder
        }
    }

    /// Writes the context's propagated state into a carrier.
    pub fn inject(&self, context: &Context, carrier: &mut dyn CarrierInjector) {
        self.codec.inject(context, carrier);
    }

    /// Reads propagated state from a carrier into a derived context.
    #[must_use]
    pub fn extract(&self, context: &Context, carrier: &dyn CarrierExtractor) -> Context {
        self.codec.extract(context, carrier)
    }

    /// Drains queued finished spans into the exporter. Returns how many
    /// spans were handed over.
    pub fn flush(&self) -> usize {
        self.export_queue.drain_into(self.exporter.as_ref())
    }
}

/// Builder assembling a [`Weaver`].
pub struct WeaverBuilder {
    config: Config,
    instrumentations: InstrumentationSet,
    decorators: DecoratorRegistry,
    codec: CompositeCodec,
    exporter: Arc<dyn SpanExporter>,
    id_source: Arc<dyn IdSource>,
}

impl Default for WeaverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WeaverBuilder {
    /// Creates a builder with defaults: standard wire codecs, a JSON log
    /// exporter and operating-system entropy for ids.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            instrumentations: InstrumentationSet::new(),
            decorators: DecoratorRegistry::new(),
            codec: CompositeCodec::standard(),
            exporter: Arc::new(JsonLogExporter),
            id_source: Arc::new(OsIdSource),
        }
    }

    /// Uses this configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Installs an instrumentation.
    #[must_use]
    pub fn with_instrumentation(
        mut self,
        instrumentation: Arc<crate::advice::Instrumentation>,
    ) -> Self {
        self.instrumentations = self.instrumentations.with(instrumentation);
        self
    }

    /// Registers a decorator.
    #[must_use]
    pub fn with_decorator(self, decorator: Arc<dyn Decorator>) -> Self {
        self.decorators.register(decorator);
        self
    }

    /// Adds a wire codec on top of the standard ones.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn PropagationCodec>) -> Self {
        self.codec = self.codec.with(codec);
        self
    }

    /// Replaces the exporter finished spans are drained into.
    #[must_use]
    pub fn with_exporter(mut self, exporter: Arc<dyn SpanExporter>) -> Self {
        self.exporter = exporter;
        self
    }

    /// Replaces the id source used for new trace and span ids.
    #[must_use]
    pub fn with_id_source(mut self, id_source: Arc<dyn IdSource>) -> Self {
        self.id_source = id_source;
        self
    }

    /// Assembles the weaver, seeding the executor rules from configuration.
    #[must_use]
    pub fn build(self) -> Weaver {
        let executors = Arc::new(ExecutorRegistry::new());
        executors.set_all_enabled(self.config.executors_all_enabled());
        for name in self.config.executors_include() {
            executors.include(name);
        }
        for prefix in self.config.executors_exclude_prefixes() {
            executors.deny_prefix(prefix);
        }

        let states: Arc<StateTable<dyn Task>> = Arc::new(StateTable::new());
        let propagator = TaskPropagator::new(states, Arc::clone(&executors));
        let export_queue = ExportQueue::with_capacity(self.config.export_queue_capacity());

        Weaver {
            config: self.config,
            instrumentations: self.instrumentations,
            executors,
            decorators: self.decorators,
            propagator,
            codec: self.codec,
            export_queue,
            exporter: self.exporter,
            id_source: self.id_source,
        }
    }
}

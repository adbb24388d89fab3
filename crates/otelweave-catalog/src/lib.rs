#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]

//! Default instrumentation catalog.
//!
//! Read-only lookup data mapping popular npm packages to the
//! OpenTelemetry contrib instrumentation that patches them, with the
//! version ranges each instrumentation supports. The core pipeline
//! never hardcodes package knowledge; callers pass these definitions
//! (or their own) into `PluginConfig`.
//!
//! Declaration order matters: when several definitions cover the same
//! package, the first listed wins.

use otelweave_core::InstrumentationDefinition;
use serde_json::Value;

fn definition(
    name: &str,
    target_package: &str,
    version_range: &str,
    otel_class: &str,
    otel_package: &str,
) -> InstrumentationDefinition {
    InstrumentationDefinition {
        name: name.to_string(),
        target_package: target_package.to_string(),
        version_range: version_range.to_string(),
        files: Vec::new(),
        otel_class: otel_class.to_string(),
        otel_package: otel_package.to_string(),
        default_config: Value::Null,
    }
}

pub fn express() -> InstrumentationDefinition {
    definition(
        "express",
        "express",
        ">=4.0.0 <6",
        "ExpressInstrumentation",
        "@opentelemetry/instrumentation-express",
    )
}

pub fn fastify() -> InstrumentationDefinition {
    definition(
        "fastify",
        "fastify",
        ">=3.0.0 <6",
        "FastifyInstrumentation",
        "@opentelemetry/instrumentation-fastify",
    )
}

pub fn koa() -> InstrumentationDefinition {
    definition(
        "koa",
        "koa",
        ">=2.0.0 <4",
        "KoaInstrumentation",
        "@opentelemetry/instrumentation-koa",
    )
}

pub fn ioredis() -> InstrumentationDefinition {
    definition(
        "ioredis",
        "ioredis",
        ">=2.0.0 <6",
        "IORedisInstrumentation",
        "@opentelemetry/instrumentation-ioredis",
    )
}

pub fn pg() -> InstrumentationDefinition {
    definition(
        "pg",
        "pg",
        ">=8.0.0 <9",
        "PgInstrumentation",
        "@opentelemetry/instrumentation-pg",
    )
}

pub fn kafkajs() -> InstrumentationDefinition {
    definition(
        "kafkajs",
        "kafkajs",
        ">=0.1.0 <3",
        "KafkaJsInstrumentation",
        "@opentelemetry/instrumentation-kafkajs",
    )
}

pub fn mongodb() -> InstrumentationDefinition {
    definition(
        "mongodb",
        "mongodb",
        ">=3.3.0 <7",
        "MongoDBInstrumentation",
        "@opentelemetry/instrumentation-mongodb",
    )
}

pub fn amqplib() -> InstrumentationDefinition {
    definition(
        "amqplib",
        "amqplib",
        ">=0.5.5 <1",
        "AmqplibInstrumentation",
        "@opentelemetry/instrumentation-amqplib",
    )
}

/// All default definitions, in tie-break order.
pub fn default_instrumentations() -> Vec<InstrumentationDefinition> {
    vec![
        express(),
        fastify(),
        koa(),
        ioredis(),
        pg(),
        kafkajs(),
        mongodb(),
        amqplib(),
    ]
}

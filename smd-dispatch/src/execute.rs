//! `Batch::execute`: the grouping, framing, and reply-scatter algorithm.

use std::collections::BTreeMap;

use smd_backend::BackendError;
use smd_model::{Batch, Operation, Record, Scheme, Search, Semantics};
use smd_sharder::Topology;

use crate::connection::ConnectionPool;
use crate::context::DispatchContext;
use crate::wire::{self, ReplyFragment, Verb};
use crate::DispatchError;

/// The extension trait giving [`Batch`] its execution entry point.
///
/// Lives here rather than on `Batch` itself so the object model crate
/// stays transport- and backend-agnostic.
pub trait BatchExt {
    /// Dispatch every enqueued operation and scatter replies back into the
    /// client objects that enqueued them.
    ///
    /// # Errors
    ///
    /// Returns the *first* failure encountered; operations
    /// dispatched before that point are not rolled back, and any
    /// successful write-backs they produced stand.
    fn execute(&mut self, ctx: &DispatchContext) -> Result<(), DispatchError>;
}

impl BatchExt for Batch {
    fn execute(&mut self, ctx: &DispatchContext) -> Result<(), DispatchError> {
        let semantics = self.semantics();
        let ops = self.drain();

        let mut apply_scheme_ops = Vec::new();
        let mut get_scheme_ops = Vec::new();
        let mut insert_ops = Vec::new();
        let mut update_ops = Vec::new();
        let mut delete_ops = Vec::new();
        let mut get_ops = Vec::new();
        let mut search_ops = Vec::new();

        for op in ops {
            match op {
                Operation::ApplyScheme(s) => apply_scheme_ops.push(s),
                Operation::GetScheme(s) => get_scheme_ops.push(s),
                Operation::Insert(r) => insert_ops.push(r),
                Operation::Update(r) => update_ops.push(r),
                Operation::Delete(r) => delete_ops.push(r),
                Operation::Get(r) => get_ops.push(r),
                Operation::Search(s) => search_ops.push(s),
            }
        }

        let mut first_err: Option<DispatchError> = None;

        tracing::debug!(
            apply_scheme = apply_scheme_ops.len(),
            get_scheme = get_scheme_ops.len(),
            insert = insert_ops.len(),
            update = update_ops.len(),
            delete = delete_ops.len(),
            get = get_ops.len(),
            search = search_ops.len(),
            "executing batch"
        );

        for (shard, group) in group_by_shard(apply_scheme_ops, &ctx.topology, Scheme::namespace) {
            run_apply_scheme(ctx, shard, group, semantics, &mut first_err);
        }
        for (shard, group) in group_by_shard(get_scheme_ops, &ctx.topology, Scheme::namespace) {
            run_get_scheme(ctx, shard, group, semantics, &mut first_err);
        }
        for (shard, group) in group_by_shard(insert_ops, &ctx.topology, Record::namespace) {
            run_record_write(ctx, shard, group, semantics, Verb::Insert, &mut first_err);
        }
        for (shard, group) in group_by_shard(update_ops, &ctx.topology, Record::namespace) {
            run_record_write(ctx, shard, group, semantics, Verb::Update, &mut first_err);
        }
        for (shard, group) in group_by_shard(delete_ops, &ctx.topology, Record::namespace) {
            run_delete(ctx, shard, group, semantics, &mut first_err);
        }
        for (shard, group) in group_by_shard(get_ops, &ctx.topology, Record::namespace) {
            run_get(ctx, shard, group, semantics, &mut first_err);
        }
        for search in search_ops {
            run_search(ctx, search, &mut first_err);
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn group_by_shard<T>(items: Vec<T>, topology: &Topology, namespace_of: impl Fn(&T) -> String) -> BTreeMap<usize, Vec<T>> {
    let mut groups: BTreeMap<usize, Vec<T>> = BTreeMap::new();
    for item in items {
        let shard = topology.shard_for(&namespace_of(&item));
        groups.entry(shard).or_default().push(item);
    }
    groups
}

fn record_first(first_err: &mut Option<DispatchError>, err: DispatchError) {
    if first_err.is_none() {
        *first_err = Some(err);
    }
}

fn semantics_flags(semantics: Semantics) -> (u8, u8, u8) {
    (
        semantics.consistency as u8,
        semantics.safety as u8,
        semantics.persistency as u8,
    )
}

fn send_and_receive(pool: &dyn ConnectionPool, shard: usize, request: &[u8]) -> Result<Vec<u8>, DispatchError> {
    let mut connection = pool.acquire(shard)?;
    connection.send(request)?;
    connection.receive()
}

fn run_apply_scheme(ctx: &DispatchContext, shard: usize, ops: Vec<Scheme>, semantics: Semantics, first_err: &mut Option<DispatchError>) {
    if let Some(backend) = ctx.local_backends.get(&shard) {
        for scheme in ops {
            let fields = scheme.fields();
            let outcome = ctx.runtime.block_on(backend.apply_scheme(&scheme.namespace(), &fields));
            match outcome {
                Ok(()) => scheme.mark_applied(),
                Err(e) => record_first(first_err, e.into()),
            }
        }
        return;
    }
    let Some(pool) = &ctx.pool else {
        for _ in &ops {
            record_first(first_err, DispatchError::NoRoute(shard));
        }
        return;
    };
    let payloads: Vec<Vec<u8>> = ops.iter().map(|s| wire::encode_apply_scheme(&s.namespace(), &s.to_document())).collect();
    let (c, s, p) = semantics_flags(semantics);
    let request = wire::encode_request(Verb::ApplyScheme, c, s, p, &payloads);
    match send_and_receive(pool.as_ref(), shard, &request) {
        Ok(reply) => scatter_ok_replies(Verb::ApplyScheme, &reply, ops, first_err, |scheme| scheme.mark_applied()),
        Err(e) => {
            for _ in &ops {
                record_first(first_err, e.clone());
            }
        }
    }
}

fn run_get_scheme(ctx: &DispatchContext, shard: usize, ops: Vec<Scheme>, semantics: Semantics, first_err: &mut Option<DispatchError>) {
    if let Some(backend) = ctx.local_backends.get(&shard) {
        for scheme in ops {
            let outcome = ctx.runtime.block_on(backend.get_scheme(&scheme.namespace()));
            match outcome {
                Ok(fields) => {
                    let mut doc = smd_doc::Document::new();
                    for (name, tag) in fields {
                        let code = smd_types::tag_to_code(tag).expect("backend returns only valid tags");
                        let _ = doc.insert(name, smd_doc::Value::I64(code));
                    }
                    if let Err(e) = scheme.install_from_document(&doc) {
                        record_first(first_err, BackendError::Storage(e.to_string()).into());
                    }
                }
                Err(e) => record_first(first_err, e.into()),
            }
        }
        return;
    }
    let Some(pool) = &ctx.pool else {
        for _ in &ops {
            record_first(first_err, DispatchError::NoRoute(shard));
        }
        return;
    };
    let payloads: Vec<Vec<u8>> = ops.iter().map(|s| wire::encode_get_scheme(&s.namespace())).collect();
    let (c, s, p) = semantics_flags(semantics);
    let request = wire::encode_request(Verb::GetScheme, c, s, p, &payloads);
    match send_and_receive(pool.as_ref(), shard, &request) {
        Ok(reply) => scatter_document_replies(Verb::GetScheme, &reply, ops, first_err, |scheme, doc| {
            scheme.install_from_document(&doc).map_err(|e| BackendError::Storage(e.to_string()))
        }),
        Err(e) => {
            for _ in &ops {
                record_first(first_err, e.clone());
            }
        }
    }
}

fn run_record_write(
    ctx: &DispatchContext,
    shard: usize,
    ops: Vec<Record>,
    semantics: Semantics,
    verb: Verb,
    first_err: &mut Option<DispatchError>,
) {
    if let Some(backend) = ctx.local_backends.get(&shard) {
        for record in ops {
            let values = record.values();
            let outcome = ctx.runtime.block_on(async {
                match verb {
                    Verb::Insert => backend.insert(&record.namespace(), &record.key(), &values).await,
                    Verb::Update => backend.update(&record.namespace(), &record.key(), &values).await,
                    _ => unreachable!("run_record_write only handles Insert/Update"),
                }
            });
            if let Err(e) = outcome {
                record_first(first_err, e.into());
            }
        }
        return;
    }
    let Some(pool) = &ctx.pool else {
        for _ in &ops {
            record_first(first_err, DispatchError::NoRoute(shard));
        }
        return;
    };
    let payloads: Vec<Vec<u8>> = ops
        .iter()
        .map(|r| wire::encode_record_write(&r.namespace(), &r.key(), &r.values()))
        .collect();
    let (c, s, p) = semantics_flags(semantics);
    let request = wire::encode_request(verb, c, s, p, &payloads);
    match send_and_receive(pool.as_ref(), shard, &request) {
        Ok(reply) => scatter_ok_replies(verb, &reply, ops, first_err, |_record| {}),
        Err(e) => {
            for _ in &ops {
                record_first(first_err, e.clone());
            }
        }
    }
}

fn run_delete(ctx: &DispatchContext, shard: usize, ops: Vec<Record>, semantics: Semantics, first_err: &mut Option<DispatchError>) {
    if let Some(backend) = ctx.local_backends.get(&shard) {
        for record in ops {
            let outcome = ctx.runtime.block_on(backend.delete(&record.namespace(), &record.key()));
            if let Err(e) = outcome {
                record_first(first_err, e.into());
            }
        }
        return;
    }
    let Some(pool) = &ctx.pool else {
        for _ in &ops {
            record_first(first_err, DispatchError::NoRoute(shard));
        }
        return;
    };
    let payloads: Vec<Vec<u8>> = ops.iter().map(|r| wire::encode_key_ref(&r.namespace(), &r.key())).collect();
    let (c, s, p) = semantics_flags(semantics);
    let request = wire::encode_request(Verb::Delete, c, s, p, &payloads);
    match send_and_receive(pool.as_ref(), shard, &request) {
        Ok(reply) => scatter_ok_replies(Verb::Delete, &reply, ops, first_err, |_record| {}),
        Err(e) => {
            for _ in &ops {
                record_first(first_err, e.clone());
            }
        }
    }
}

fn run_get(ctx: &DispatchContext, shard: usize, ops: Vec<Record>, semantics: Semantics, first_err: &mut Option<DispatchError>) {
    if let Some(backend) = ctx.local_backends.get(&shard) {
        for record in ops {
            let outcome = ctx.runtime.block_on(backend.get(&record.namespace(), &record.key()));
            match outcome {
                Ok(doc) => record.install_values(doc),
                Err(e) => record_first(first_err, e.into()),
            }
        }
        return;
    }
    let Some(pool) = &ctx.pool else {
        for _ in &ops {
            record_first(first_err, DispatchError::NoRoute(shard));
        }
        return;
    };
    let payloads: Vec<Vec<u8>> = ops.iter().map(|r| wire::encode_key_ref(&r.namespace(), &r.key())).collect();
    let (c, s, p) = semantics_flags(semantics);
    let request = wire::encode_request(Verb::Get, c, s, p, &payloads);
    match send_and_receive(pool.as_ref(), shard, &request) {
        Ok(reply) => scatter_document_replies(Verb::Get, &reply, ops, first_err, |record, doc| {
            record.install_values(doc);
            Ok(())
        }),
        Err(e) => {
            for _ in &ops {
                record_first(first_err, e.clone());
            }
        }
    }
}

/// `Search` never leaves the process (the execution algorithm's grouping
/// loop only iterates apply-scheme, get-scheme, insert, update, delete, and
/// get); a search without a co-hosted backend for its namespace's shard
/// simply fails to route, since there is no remote search wire format.
fn run_search(ctx: &DispatchContext, search: Search, first_err: &mut Option<DispatchError>) {
    let namespace = search.scheme().namespace();
    let shard = ctx.topology.shard_for(&namespace);
    match ctx.local_backends.get(&shard) {
        Some(backend) => {
            let outcome = ctx.runtime.block_on(backend.search(&namespace, &smd_doc::Document::new()));
            match outcome {
                Ok(_cursor) => search.install_results(),
                Err(e) => record_first(first_err, e.into()),
            }
        }
        None => record_first(first_err, DispatchError::NoRoute(shard)),
    }
}

fn scatter_ok_replies<T>(verb: Verb, reply: &[u8], ops: Vec<T>, first_err: &mut Option<DispatchError>, on_success: impl Fn(&T)) {
    let mut rest = reply;
    for item in &ops {
        match wire::decode_reply(verb, rest) {
            Ok((ReplyFragment::Ok(true), r)) => {
                rest = r;
                on_success(item);
            }
            Ok((ReplyFragment::Ok(false), r)) => {
                rest = r;
                record_first(first_err, BackendError::Storage("operation reported failure".into()).into());
            }
            Ok((ReplyFragment::Document(_), r)) => {
                rest = r;
                record_first(first_err, BackendError::Storage("unexpected document reply for a non-reading verb".into()).into());
            }
            Err(e) => {
                record_first(first_err, e.into());
                break;
            }
        }
    }
}

fn scatter_document_replies<T>(
    verb: Verb,
    reply: &[u8],
    ops: Vec<T>,
    first_err: &mut Option<DispatchError>,
    install: impl Fn(&T, smd_doc::Document) -> Result<(), BackendError>,
) {
    let mut rest = reply;
    for item in &ops {
        match wire::decode_reply(verb, rest) {
            Ok((ReplyFragment::Document(Some(doc)), r)) => {
                rest = r;
                if let Err(e) = install(item, doc) {
                    record_first(first_err, e.into());
                }
            }
            Ok((ReplyFragment::Document(None), r)) => {
                rest = r;
                record_first(first_err, BackendError::Storage("not found".into()).into());
            }
            Ok((ReplyFragment::Ok(_), r)) => {
                rest = r;
                record_first(first_err, BackendError::Storage("unexpected ok reply for a reading verb".into()).into());
            }
            Err(e) => {
                record_first(first_err, e.into());
                break;
            }
        }
    }
}

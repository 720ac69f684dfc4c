//! Built-in request types.
//!
//! | tag              | arguments                                   |
//! |------------------|---------------------------------------------|
//! | `ChangeFlag`     | `[entity, field, bool]`                     |
//! | `Data`           | `[entity, field, value, (field, value)*]`   |
//! | `CompositeState` | `[[entity, field, value], ...]`             |
//! | `Composite`      | `[["Tag", [args...]], ...]`                 |
//! | `Batch`          | `[batch_tag, ["Tag", [args...]], ...]`      |

use crate::composite::{BatchRequest, CompositeRequest};
use crate::error::{Result, TxnError};
use crate::field_state::FieldStateRequest;
use crate::registry::{RequestRegistry, RequestSpec};
use crate::request::{Request, RequestHandle, RequestType};
use fp_core::{EntityId, FieldAccess, FieldName, Value};

pub(crate) fn register_builtins<C: FieldAccess + Send + 'static>(registry: &mut RequestRegistry<C>) {
    registry.register("ChangeFlag", change_flag::<C>);
    registry.register("Data", data::<C>);
    registry.register("CompositeState", composite_state::<C>);
    registry.register("Composite", composite::<C>);
    registry.register("Batch", batch::<C>);
}

// ─── Argument helpers ─────────────────────────────────────────────────────

fn entity_arg(tag: &str, value: &Value, position: usize) -> Result<EntityId> {
    value.as_entity().ok_or_else(|| {
        TxnError::invalid(
            tag,
            format!("argument {position} must be an entity, got {}", value.type_name()),
        )
    })
}

fn field_arg(tag: &str, value: &Value, position: usize) -> Result<FieldName> {
    match value.as_str() {
        Some(name) if !name.is_empty() => Ok(FieldName::intern(name)),
        _ => Err(TxnError::invalid(
            tag,
            format!("argument {position} must be a field name"),
        )),
    }
}

fn nested_children<C>(
    registry: &RequestRegistry<C>,
    tag: &str,
    specs: impl IntoIterator<Item = Value>,
) -> Result<Vec<RequestHandle<C>>> {
    specs
        .into_iter()
        .map(|value| {
            let spec = RequestSpec::from_value(value, tag)?;
            registry.create_from_spec(&spec)
        })
        .collect()
}

// ─── Factories ────────────────────────────────────────────────────────────

fn change_flag<C: FieldAccess + Send + 'static>(
    _: &RequestRegistry<C>,
    args: Vec<Value>,
) -> Result<Box<dyn Request<C>>> {
    const TAG: &str = "ChangeFlag";
    let [target, field, flag] = args.as_slice() else {
        return Err(TxnError::invalid(
            TAG,
            format!("expected [entity, field, bool], got {} arguments", args.len()),
        ));
    };
    let target = entity_arg(TAG, target, 0)?;
    let field = field_arg(TAG, field, 1)?;
    let flag = flag
        .as_bool()
        .ok_or_else(|| TxnError::invalid(TAG, "argument 2 must be a bool"))?;
    Ok(Box::new(FieldStateRequest::new(target).set(field, flag)))
}

fn data<C: FieldAccess + Send + 'static>(
    _: &RequestRegistry<C>,
    args: Vec<Value>,
) -> Result<Box<dyn Request<C>>> {
    const TAG: &str = "Data";
    if args.len() < 3 || args.len() % 2 == 0 {
        return Err(TxnError::invalid(
            TAG,
            "expected [entity, field, value, (field, value)*]",
        ));
    }
    let mut args = args.into_iter();
    let target = match args.next() {
        Some(v) => entity_arg(TAG, &v, 0)?,
        None => return Err(TxnError::invalid(TAG, "missing target entity")),
    };
    let mut request = FieldStateRequest::new(target);
    let mut position = 1;
    while let (Some(field), Some(value)) = (args.next(), args.next()) {
        request.push(field_arg(TAG, &field, position)?, value);
        position += 2;
    }
    Ok(Box::new(request))
}

fn composite_state<C: FieldAccess + Send + 'static>(
    _: &RequestRegistry<C>,
    args: Vec<Value>,
) -> Result<Box<dyn Request<C>>> {
    const TAG: &str = "CompositeState";
    if args.is_empty() {
        return Err(TxnError::invalid(TAG, "expected at least one [entity, field, value]"));
    }
    // One field-state request per entity, in order of first appearance.
    let mut per_entity: Vec<FieldStateRequest> = Vec::new();
    for (position, triple) in args.into_iter().enumerate() {
        let Some([target, field, value]) = triple.as_list().and_then(|t| <&[Value; 3]>::try_from(t).ok())
        else {
            return Err(TxnError::invalid(
                TAG,
                format!("argument {position} must be [entity, field, value]"),
            ));
        };
        let target = entity_arg(TAG, target, position)?;
        let field = field_arg(TAG, field, position)?;
        match per_entity.iter_mut().find(|r| r.target() == target) {
            Some(request) => request.push(field, value.clone()),
            None => {
                let mut request = FieldStateRequest::new(target);
                request.push(field, value.clone());
                per_entity.push(request);
            }
        }
    }
    let children = per_entity
        .into_iter()
        .map(|r| RequestHandle::new(RequestType::Data, r))
        .collect();
    Ok(Box::new(CompositeRequest::new(children)))
}

fn composite<C: FieldAccess + Send + 'static>(
    registry: &RequestRegistry<C>,
    args: Vec<Value>,
) -> Result<Box<dyn Request<C>>> {
    let children = nested_children(registry, "Composite", args)?;
    Ok(Box::new(CompositeRequest::new(children)))
}

fn batch<C: FieldAccess + Send + 'static>(
    registry: &RequestRegistry<C>,
    args: Vec<Value>,
) -> Result<Box<dyn Request<C>>> {
    const TAG: &str = "Batch";
    let mut args = args.into_iter();
    let batch_tag = match args.next() {
        Some(Value::Text(tag)) => tag,
        _ => return Err(TxnError::invalid(TAG, "argument 0 must be the batch tag")),
    };
    let children = nested_children(registry, TAG, args)?;
    Ok(Box::new(BatchRequest::new(batch_tag, children)))
}

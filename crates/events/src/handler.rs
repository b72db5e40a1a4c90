/// Execute an aggregate command in place (decide, then apply).
///
/// Used by tests and in-process flows that do not need persistence. The
/// persisted pipeline lives in the infra crate's `CommandDispatcher`.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: factoryerp_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}

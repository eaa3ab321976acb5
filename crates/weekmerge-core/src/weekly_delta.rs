use polars::prelude::*;

/// Turns a cumulative quantity into period deltas per entity.
///
/// Rows are sorted by entity then week key (keys are fixed width, so string
/// order is chronological). The first row of each entity gets 0, every later
/// row the difference to its predecessor. Negative deltas are kept. A missing
/// value on either side of a difference yields 0.
pub fn compute_weekly_deltas(
    batch: &DataFrame,
    entity_column: &str,
    key_column: &str,
    cumulative_column: &str,
    delta_column: &str,
) -> PolarsResult<DataFrame> {
    let mut sorted = batch
        .clone()
        .lazy()
        .sort(
            [entity_column, key_column],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?;

    let entities = sorted.column(entity_column)?.cast(&DataType::String)?;
    let entities = entities.str()?;
    let cumulative = sorted.column(cumulative_column)?.cast(&DataType::Float64)?;
    let cumulative = cumulative.f64()?;

    let mut deltas = Vec::with_capacity(sorted.height());
    let mut previous: Option<(Option<&str>, Option<f64>)> = None;
    for (entity, value) in entities.into_iter().zip(cumulative.into_iter()) {
        let delta = match previous {
            Some((previous_entity, previous_value))
                if entity.is_some() && previous_entity == entity =>
            {
                match (value, previous_value) {
                    (Some(current), Some(prior)) => current - prior,
                    _ => 0.0,
                }
            }
            _ => 0.0,
        };
        deltas.push(delta);
        previous = Some((entity, value));
    }

    sorted.with_column(Series::new(delta_column.into(), deltas))?;
    Ok(sorted)
}

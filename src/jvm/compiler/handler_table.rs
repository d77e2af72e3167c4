use crate::jvm::code::{HandlerList, RawHandler};
use crate::jvm::{Error, Name};
use std::collections::HashMap;

/// Build the exception table from the handlers covering each instruction
///
/// The JVM picks the first matching entry in the table, so entries are ordered by position in
/// the handler lists: every innermost handler comes before any second-innermost handler, and so
/// on. Consecutive instructions with the same handler at the same position share one entry.
/// Instructions that encode to nothing don't break up entries.
pub fn exception_table(
    handlers: &[HandlerList],
    offsets: &[usize],
    catch_types: &HashMap<Name, u16>,
) -> Result<Vec<RawHandler>, Error> {
    let depth = handlers.iter().map(|list| list.len()).max().unwrap_or(0);
    let mut table = vec![];
    for position in 0..depth {
        let mut open: Option<(usize, usize, usize)> = None;
        for (index, list) in handlers.iter().enumerate() {
            let (start, end) = (offsets[index], offsets[index + 1]);
            if start == end {
                continue;
            }
            match (open, list.get(position)) {
                (Some((from, _, handler_of)), Some(handler))
                    if handlers[handler_of].get(position) == Some(handler) =>
                {
                    open = Some((from, end, handler_of));
                }
                (previous, current) => {
                    if let Some((from, until, handler_of)) = previous {
                        let list = &handlers[handler_of];
                        table.push(entry(list, position, from, until, offsets, catch_types)?);
                    }
                    open = current.map(|_| (start, end, index));
                }
            }
        }
        if let Some((from, until, handler_of)) = open {
            let list = &handlers[handler_of];
            table.push(entry(list, position, from, until, offsets, catch_types)?);
        }
    }
    Ok(table)
}

fn entry(
    list: &HandlerList,
    position: usize,
    from: usize,
    until: usize,
    offsets: &[usize],
    catch_types: &HashMap<Name, u16>,
) -> Result<RawHandler, Error> {
    let handler = &list[position];
    let to_u16 = |offset: usize| {
        u16::try_from(offset).map_err(|_| {
            Error::InvalidOperand(format!(
                "offset {} does not fit in an exception table entry",
                offset
            ))
        })
    };
    let catch_type = match &handler.catch_class {
        None => 0,
        Some(class) => *catch_types.get(class).ok_or_else(|| {
            Error::InvalidOperand(format!("no constant pool entry for class {}", class))
        })?,
    };
    Ok(RawHandler {
        start: to_u16(from)?,
        end: to_u16(until)?,
        target: to_u16(offsets[handler.target])?,
        catch_type,
    })
}

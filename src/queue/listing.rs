use super::{entry::QueueEntry, progress::format_duration};

pub const PAGE_SIZE: usize = 10;

pub fn page_count(len: usize) -> usize {
    len.div_ceil(PAGE_SIZE)
}

/// Lines of page `page` (zero-based): ``{pos}) `{m:ss}` {title} - {submitter}``.
/// Positions are 1-based across the whole queue.
pub fn render_page(entries: &[QueueEntry], page: usize) -> Vec<String> {
    entries
        .iter()
        .enumerate()
        .skip(page * PAGE_SIZE)
        .take(PAGE_SIZE)
        .map(|(index, entry)| {
            let duration = match &entry.info {
                Some(info) => format_duration(info.duration),
                None => "?:??".to_string(),
            };
            let mut line = format!("{}) `{}` {}", index + 1, duration, entry.title());
            if let Some(submitter) = &entry.submitter {
                line.push_str(" - ");
                line.push_str(submitter);
            }
            line
        })
        .collect()
}

//! Statement generation for blocking analysis.

use crate::blocking::rule::BlockingRule;
use crate::pipeline::QueryStep;
use crate::session::LinkageSession;
use crate::settings::LinkType;

/// Tables joined as the left and right side of candidate pairs.
///
/// Two-dataset link-only joins the raw inputs; everything else joins the
/// concatenated table to itself.
pub fn pair_sources(session: &LinkageSession<'_>) -> (String, String) {
    if session.is_two_dataset_link_only() {
        let inputs = session.inputs();
        (inputs[0].templated_name.clone(), inputs[1].templated_name.clone())
    } else {
        let concat = session.concat_role();
        (concat.clone(), concat)
    }
}

/// Identifier of a record that is unique across all inputs.
fn composite_unique_id(session: &LinkageSession<'_>, side: &str) -> String {
    let settings = session.settings();
    let uid = format!("{}.{}", side, settings.unique_id_column_name);
    if settings.link_type == LinkType::DedupeOnly {
        return uid;
    }
    let source = format!("{}.{}", side, settings.source_dataset_column_name);
    session
        .engine()
        .dialect()
        .concat(&[source, "'-__-'".to_string(), uid])
}

/// Filter keeping each unordered pair once and dropping pairs the link type
/// excludes.
pub fn where_condition(session: &LinkageSession<'_>) -> String {
    if session.is_two_dataset_link_only() {
        return "where 1=1".to_string();
    }

    let id_l = composite_unique_id(session, "l");
    let id_r = composite_unique_id(session, "r");
    match session.link_type() {
        LinkType::DedupeOnly | LinkType::LinkAndDedupe => format!("where {} < {}", id_l, id_r),
        LinkType::LinkOnly => {
            let source = &session.settings().source_dataset_column_name;
            format!(
                "where {} < {} and l.{} != r.{}",
                id_l, id_r, source, source
            )
        }
    }
}

/// Statement producing one row per candidate pair, tagged with the index of
/// the first rule that generates it.
///
/// Rule `i` excludes every pair an earlier rule already produced, so each
/// pair is counted under exactly one `match_key`.
pub fn block_using_rules_sql(session: &LinkageSession<'_>, rules: &[BlockingRule]) -> String {
    let (left, right) = pair_sources(session);
    let where_clause = where_condition(session);

    rules
        .iter()
        .enumerate()
        .map(|(i, rule)| {
            let exclusions: String = rules[..i]
                .iter()
                .map(|earlier| format!("\n    and not (coalesce(({}), false))", earlier.predicate()))
                .collect();
            format!(
                "select {i} as match_key\nfrom {left} as l\ninner join {right} as r\non ({})\n{where_clause}{exclusions}",
                rule.predicate()
            )
        })
        .collect::<Vec<_>>()
        .join("\nunion all\n")
}

/// Statement counting blocked pairs per rule.
pub fn count_by_match_key_sql(blocked_role: &str) -> String {
    format!(
        "select count(*) as row_count, match_key\nfrom {}\ngroup by match_key\norder by match_key",
        blocked_role
    )
}

/// Statement counting records per dataset in the concatenated table.
pub fn dataset_counts_sql(session: &LinkageSession<'_>) -> String {
    let concat = session.concat_role();
    if session.link_type() == LinkType::DedupeOnly && session.inputs().len() == 1 {
        format!("select count(*) as count\nfrom {}", concat)
    } else {
        let source = &session.settings().source_dataset_column_name;
        format!(
            "select count(*) as count\nfrom {}\ngroup by {}",
            concat, source
        )
    }
}

/// Steps estimating the comparisons a rule generates before the link-type
/// filter is applied, from grouped join key counts.
///
/// Returns `None` when the rule has no equi-join keys.
pub fn pre_filter_steps(session: &LinkageSession<'_>, rule: &BlockingRule) -> Option<Vec<QueryStep>> {
    let keys = rule.equi_join_keys();
    if keys.is_empty() {
        return None;
    }

    let config = session.engine().config();
    let (left, right) = pair_sources(session);
    let l_role = config.role("count_comparisons_from_blocking_l");
    let r_role = config.role("count_comparisons_from_blocking_r");
    let counts_role = config.role("block_counts");

    let l_select = keys
        .iter()
        .enumerate()
        .map(|(i, (l, _))| format!("{} as key_{}", l, i))
        .collect::<Vec<_>>()
        .join(", ");
    let r_select = keys
        .iter()
        .enumerate()
        .map(|(i, (_, r))| format!("{} as key_{}", r, i))
        .collect::<Vec<_>>()
        .join(", ");
    let l_group = keys.iter().map(|(l, _)| l.as_str()).collect::<Vec<_>>().join(", ");
    let r_group = keys.iter().map(|(_, r)| r.as_str()).collect::<Vec<_>>().join(", ");
    let using = (0..keys.len())
        .map(|i| format!("key_{}", i))
        .collect::<Vec<_>>()
        .join(", ");

    Some(vec![
        QueryStep::new(
            format!(
                "select {}, count(*) as count_l\nfrom {}\ngroup by {}",
                l_select, left, l_group
            ),
            l_role.clone(),
        ),
        QueryStep::new(
            format!(
                "select {}, count(*) as count_r\nfrom {}\ngroup by {}",
                r_select, right, r_group
            ),
            r_role.clone(),
        ),
        QueryStep::new(
            format!(
                "select count_l * count_r as block_count\nfrom {}\ninner join {}\nusing ({})",
                l_role, r_role, using
            ),
            counts_role.clone(),
        ),
        QueryStep::new(
            format!(
                "select sum(block_count) as count_of_pairwise_comparisons_generated\nfrom {}",
                counts_role
            ),
            config.role("total_of_block_counts"),
        ),
    ])
}

/// Step multiplying the sizes of both sides, for rules without join keys.
pub fn cartesian_fallback_step(session: &LinkageSession<'_>) -> QueryStep {
    let role = session.engine().config().role("total_of_block_counts");
    let (left, right) = pair_sources(session);
    let sql = if session.is_two_dataset_link_only() {
        format!(
            "select (select count(*) from {}) * (select count(*) from {}) as count_of_pairwise_comparisons_generated",
            left, right
        )
    } else {
        format!(
            "select count(*) * count(*) as count_of_pairwise_comparisons_generated\nfrom {}",
            left
        )
    };
    QueryStep::new(sql, role)
}

/// Statement counting the pairs a rule generates after the link-type filter.
pub fn post_filter_sql(session: &LinkageSession<'_>, rule: &BlockingRule) -> String {
    let (left, right) = pair_sources(session);
    format!(
        "select count(*) as count_of_pairwise_comparisons_generated\nfrom {} as l\ninner join {} as r\non ({})\n{}",
        left,
        right,
        rule.predicate(),
        where_condition(session)
    )
}

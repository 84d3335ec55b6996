/// Derive the last page number of a paginated listing from its
/// `Link` response header, as sent by the upstream:
///
/// ```text
/// <https://host/x?page=2>; rel="next", <https://host/x?page=34>; rel="last"
/// ```
///
/// Absent or malformed headers mean a single page -- the result is
/// always >= 1.
pub fn last_page(link: Option<&str>) -> i64 {
  let Some(link) = link else {
    return 1;
  };
  for part in link.split(',') {
    let mut pieces = part.trim().split(';');
    let Some(target) = pieces.next() else {
      continue;
    };
    if !pieces.any(|piece| piece.trim() == "rel=\"last\"") {
      continue;
    }
    let target =
      target.trim().trim_start_matches('<').trim_end_matches('>');
    let Ok(target) = url::Url::parse(target) else {
      continue;
    };
    let page = target
      .query_pairs()
      .find(|(key, _)| key == "page")
      .and_then(|(_, value)| value.parse::<i64>().ok());
    if let Some(page) = page
      && page >= 1
    {
      return page;
    }
  }
  1
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn absent_header_is_one_page() {
    assert_eq!(last_page(None), 1);
  }

  #[test]
  fn finds_rel_last() {
    let link = "<https://api.github.com/repos/o/r/pulls?state=all&per_page=100&page=2>; rel=\"next\", <https://api.github.com/repos/o/r/pulls?state=all&per_page=100&page=34>; rel=\"last\"";
    assert_eq!(last_page(Some(link)), 34);
  }

  #[test]
  fn no_last_rel_is_one_page() {
    let link =
      "<https://api.github.com/repos/o/r/pulls?page=5>; rel=\"next\"";
    assert_eq!(last_page(Some(link)), 1);
  }

  #[test]
  fn malformed_is_one_page() {
    assert_eq!(last_page(Some("not a link header")), 1);
    assert_eq!(last_page(Some("<::::>; rel=\"last\"")), 1);
    // rel last present but no page param
    let link = "<https://api.github.com/repos/o/r/pulls>; rel=\"last\"";
    assert_eq!(last_page(Some(link)), 1);
  }

  #[test]
  fn zero_or_negative_pages_are_clamped() {
    let link =
      "<https://host/x?page=0>; rel=\"last\"";
    assert_eq!(last_page(Some(link)), 1);
  }
}

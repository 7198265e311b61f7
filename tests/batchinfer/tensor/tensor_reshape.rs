use anyhow::Result;
use batchinfer::Tensor;

use crate::common;

#[test]
fn reshape_preserves_flat_order() -> Result<()> {
    let mut t = common::iota(&[2, 3, 4])?;
    let before = t.values();

    t.reshape(&[24])?;
    assert_eq!(t.shapes(), [1, 1, 24]);
    assert_eq!(t.raw_shapes(), &[24]);
    assert_eq!(t.values(), before);

    t.reshape(&[4, 6])?;
    assert_eq!(t.shapes(), [1, 4, 6]);
    assert_eq!(t.at(0, 1, 0), 6.0);
    assert_eq!(t.values(), before);

    t.reshape(&[6, 2, 2])?;
    assert_eq!(t.shapes(), [6, 2, 2]);
    assert_eq!(t.at(5, 1, 1), 23.0);
    Ok(())
}

#[test]
fn reshape_rejects_bad_targets() -> Result<()> {
    let mut t = Tensor::<f32>::new(2, 3, 4);
    assert!(t.reshape(&[5, 5]).is_err());
    assert!(t.reshape(&[1, 2, 3, 4]).is_err());
    assert!(t.reshape(&[]).is_err());
    assert_eq!(t.shapes(), [2, 3, 4]);
    assert_eq!(t.raw_shapes(), &[2, 3, 4]);
    Ok(())
}

#[test]
fn flatten_collapses_to_one_dim() -> Result<()> {
    let mut t = common::iota(&[2, 2, 2])?;
    t.flatten();
    assert_eq!(t.raw_shapes(), &[8]);
    assert_eq!(t.shapes(), [1, 1, 8]);
    assert_eq!(t.index(5), 5.0);
    Ok(())
}

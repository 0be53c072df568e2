macro_rules! pick { ($x:literal) => {} }
//X
fn main() {
    macro_rules! pick { ($x:ident) => {} }
    pick!(1);
    //^
}
